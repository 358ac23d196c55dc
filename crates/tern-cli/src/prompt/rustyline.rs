use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::spinner;
use console::style;
use serde_json::Value;
use tern::models::message::Message;
use tern::models::tool::{ToolCall, ToolResult};

use super::{Input, InputType, Prompt, Theme};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30m(~)> \x1b[0m";
const MAX_STRING_LENGTH: usize = 40;
const INDENT: &str = "    ";

pub struct RustylinePrompt {
    spinner: cliclack::ProgressBar,
    theme: Theme,
}

impl RustylinePrompt {
    pub fn new() -> Self {
        RustylinePrompt {
            spinner: spinner(),
            theme: Theme::Dark,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

impl Default for RustylinePrompt {
    fn default() -> Self {
        Self::new()
    }
}

fn print_markdown(content: &str, theme: &str) {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()
        .unwrap();
}

fn render_tool_call(call: &ToolCall) {
    println!();
    println!(
        "─── {} ──────────────────────────",
        style(&call.name).magenta()
    );
    print_params(&call.arguments, 0);
    println!();
}

fn render_tool_result(result: &ToolResult, theme: &str) {
    if result.is_error {
        println!("{}", style(&result.content).red());
    } else if !result.content.is_empty() {
        print_markdown(&result.content, theme);
    }
}

/// Format and print parameters recursively with indentation and colors
fn print_params(value: &Value, depth: usize) {
    let indent = INDENT.repeat(depth);

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        println!("{}{}:", indent, style(key).dim());
                        print_params(val, depth + 1);
                    }
                    Value::String(s) => {
                        if s.len() > MAX_STRING_LENGTH {
                            println!("{}{}: {}", indent, style(key).dim(), style("...").dim());
                        } else {
                            println!("{}{}: {}", indent, style(key).dim(), style(s).green());
                        }
                    }
                    other => {
                        println!("{}{}: {}", indent, style(key).dim(), style(other).blue());
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("{}{}.", indent, i + 1);
                print_params(item, depth + 1);
            }
        }
        Value::String(s) => {
            if s.len() > MAX_STRING_LENGTH {
                println!(
                    "{}{}",
                    indent,
                    style(format!("[{} chars]", s.len())).yellow()
                );
            } else {
                println!("{}{}", indent, style(s).green());
            }
        }
        other => {
            println!("{}{}", indent, style(other).yellow());
        }
    }
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, message: Box<Message>) {
        let theme = self.theme_name();

        if !message.content.is_empty() {
            print_markdown(&message.content, theme);
        }
        for call in &message.tool_calls {
            render_tool_call(call);
        }
        for result in &message.tool_results {
            render_tool_result(result, theme);
        }

        println!();
        io::stdout().flush().expect("Failed to flush stdout");
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("thinking...");
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        let mut editor = rustyline::DefaultEditor::new()?;
        let input = editor.readline(PROMPT);
        let message_text = match input {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                match e {
                    rustyline::error::ReadlineError::Interrupted => (),
                    rustyline::error::ReadlineError::Eof => (),
                    _ => eprintln!("Input error: {}", e),
                }
                return Ok(Input {
                    input_type: InputType::Exit,
                    content: None,
                });
            }
        };

        if message_text.is_empty() {
            Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/exit")
            || message_text.eq_ignore_ascii_case("/quit")
            || message_text.eq_ignore_ascii_case("exit")
            || message_text.eq_ignore_ascii_case("quit")
        {
            Ok(Input {
                input_type: InputType::Exit,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => {
                    println!("Switching to Dark theme");
                    Theme::Dark
                }
                Theme::Dark => {
                    println!("Switching to Light theme");
                    Theme::Light
                }
            };
            Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/?")
            || message_text.eq_ignore_ascii_case("/help")
        {
            println!("Commands:");
            println!("/exit | /quit - Exit the session");
            println!("/t - Toggle Light/Dark theme");
            println!("/? | /help - Display this help message");
            println!("Ctrl+C - Interrupt the current request");
            Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            })
        } else {
            Ok(Input {
                input_type: InputType::Message,
                content: Some(message_text),
            })
        }
    }

    fn goodbye(&self) {
        println!("Goodbye.");
    }
}
