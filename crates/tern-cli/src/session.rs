use futures::StreamExt;

use crate::prompt::{InputType, Prompt};
use tern::agent::Agent;

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<impl Prompt + 'a>) -> Self {
        Session { agent, prompt }
    }

    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            let content = match input.input_type {
                InputType::Message => match input.content {
                    Some(content) => content,
                    None => continue,
                },
                InputType::Exit => break,
                InputType::AskAgain => continue,
            };

            self.prompt.show_busy();
            self.process_turn(&content).await;
            self.prompt.hide_busy();
        }

        self.prompt.goodbye();
        Ok(())
    }

    /// Run a single message through the agent without an interactive
    /// prompt, rendering everything the turn produces.
    pub async fn headless(&mut self, message: &str) -> anyhow::Result<()> {
        self.process_turn(message).await;
        Ok(())
    }

    async fn process_turn(&mut self, content: &str) {
        let mut stream = self.agent.reply(content);
        loop {
            tokio::select! {
                response = stream.next() => {
                    match response {
                        Some(Ok(message)) => self.prompt.render(Box::new(message)),
                        Some(Err(e)) => {
                            // The turn is over but the session isn't.
                            eprintln!("Error: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    drop(stream);
                    println!("\nInterrupted. The conversation keeps whatever was already exchanged.");
                    break;
                }
            }
        }
    }
}
