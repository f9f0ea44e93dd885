use crate::Result;
use crate::callbacks::Callback;
use crate::llm::Message;
use async_trait::async_trait;
use std::io::Write;

/// Writes the agent's messages as markdown while it works. Only messages
/// that were not shown in the previous step are written; a history that no
/// longer extends the previous one starts a new run section.
pub struct Transcript<W: Write + Send> {
    shown: Vec<u64>,
    writer: W,
    run: u32,
    step: u32,
}

impl<W: Write + Send> Transcript<W> {
    pub fn new(writer: W) -> Box<Self> {
        Box::new(Self {
            shown: Vec::new(),
            writer,
            run: 0,
            step: 0,
        })
    }

    fn continues_previous(&self, hashes: &[u64]) -> bool {
        hashes.len() >= self.shown.len() && hashes.iter().zip(&self.shown).all(|(a, b)| a == b)
    }

    fn write_step(&mut self, messages: &[Message]) -> Result<()> {
        writeln!(self.writer, "### Step {}\n", self.step)?;
        messages
            .iter()
            .try_for_each(|m| write!(self.writer, "{}", m))?;
        writeln!(self.writer, "---")?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> Callback for Transcript<W> {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let hashes = messages.iter().map(Message::get_hash).collect::<Vec<_>>();

        let new = if self.step > 0 && self.continues_previous(&hashes) {
            self.shown.len()
        } else {
            self.run += 1;
            self.step = 0;
            writeln!(self.writer, "## Run {}\n", self.run)?;
            0
        };

        self.write_step(&messages[new..])?;
        self.writer.flush()?;

        self.step += 1;
        self.shown = hashes;

        Ok(messages)
    }
}
