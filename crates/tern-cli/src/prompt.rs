use anyhow::Result;
use tern::models::message::Message;

pub mod rustyline;

pub trait Prompt {
    fn render(&mut self, message: Box<Message>);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn goodbye(&self);
    fn ready(&self) {
        println!();
        println!("tern is ready. Enter your instructions, or /help for commands.");
        println!();
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // None for control-flow inputs such as Exit
}

pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
