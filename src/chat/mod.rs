// Chat module
// Runs a conversation over an injected transport, one question at a time


use std::future::Future;

use async_trait::async_trait;
use console::style;
use dialoguer::Input;
use dialoguer::theme::ColorfulTheme;
use tracing::{debug, error};

use crate::Result;
use crate::assistant::Assistant;
use crate::embeddings::Generator;

pub const INITIALIZING_MESSAGE: &str = "Initializing Morocco Tourism Chatbot...";

pub const INIT_FAILED_MESSAGE: &str = "Failed to initialize the chatbot. Please check your setup.";

pub const WELCOME_MESSAGE: &str =
    "Salam! Welcome to the Morocco Tourism Chatbot! Ask me anything about traveling in Morocco.";

/// Words that end a terminal session
const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

/// Where user messages come from and replies go to
pub trait ChatTransport {
    /// Next user message; `None` ends the session
    fn receive(&mut self) -> Result<Option<String>>;

    fn send(&mut self, message: &str) -> Result<()>;
}

/// Produces the reply to one user message
#[async_trait]
pub trait Responder {
    async fn respond(&self, question: &str) -> Result<String>;
}

#[async_trait]
impl<G: Generator> Responder for Assistant<G> {
    #[inline]
    async fn respond(&self, question: &str) -> Result<String> {
        let answer = self.answer(question).await?;
        Ok(answer.render(self.shows_sources()))
    }
}

/// Counts for a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub answered: usize,
    pub failed: usize,
}

/// A conversation between one transport and one responder
pub struct ChatSession<'a, R: Responder + Sync + ?Sized> {
    responder: &'a R,
}

impl<'a, R: Responder + Sync + ?Sized> ChatSession<'a, R> {
    #[inline]
    pub fn new(responder: &'a R) -> Self {
        Self { responder }
    }

    /// Greet the user, then answer messages until the transport reports the end of the session.
    ///
    /// A failed answer is reported to the user and the session continues.
    #[inline]
    pub async fn run<T: ChatTransport + Send + ?Sized>(
        &self,
        transport: &mut T,
    ) -> Result<SessionStats> {
        transport.send(WELCOME_MESSAGE)?;

        let mut stats = SessionStats::default();

        while let Some(message) = transport.receive()? {
            let question = message.trim();
            if question.is_empty() {
                continue;
            }

            debug!("Received question ({} characters)", question.len());

            match self.responder.respond(question).await {
                Ok(reply) => {
                    transport.send(&reply)?;
                    stats.answered += 1;
                }
                Err(e) => {
                    error!("Failed to answer question: {}", e);
                    transport.send(&format!("Error processing your query: {}", e))?;
                    stats.failed += 1;
                }
            }
        }

        debug!(
            "Chat session ended: {} answered, {} failed",
            stats.answered, stats.failed
        );
        Ok(stats)
    }
}

/// Announce startup on `transport`, wait for `init` to produce the responder and run a
/// session with it.
///
/// When `init` fails the user is told so on the same transport and the error is returned.
#[inline]
pub async fn start_chat<T, R, F>(transport: &mut T, init: F) -> Result<SessionStats>
where
    T: ChatTransport + Send + ?Sized,
    R: Responder + Send + Sync,
    F: Future<Output = Result<R>> + Send,
{
    transport.send(INITIALIZING_MESSAGE)?;

    let responder = match init.await {
        Ok(responder) => responder,
        Err(e) => {
            error!("Failed to initialize chat: {}", e);
            transport.send(INIT_FAILED_MESSAGE)?;
            transport.send(&format!("Error during initialization: {}", e))?;
            return Err(e);
        }
    };

    ChatSession::new(&responder).run(transport).await
}

/// Interactive prompt on the controlling terminal
#[derive(Default)]
pub struct TerminalTransport {
    theme: ColorfulTheme,
}

impl TerminalTransport {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whether `input` asks to leave the session
#[inline]
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS
        .iter()
        .any(|command| input.eq_ignore_ascii_case(command))
}

impl ChatTransport for TerminalTransport {
    #[inline]
    fn receive(&mut self) -> Result<Option<String>> {
        let input = Input::<String>::with_theme(&self.theme)
            .with_prompt("You")
            .allow_empty(true)
            .interact_text();

        match input {
            Ok(line) if is_exit_command(&line) => Ok(None),
            Ok(line) => Ok(Some(line)),
            Err(dialoguer::Error::IO(e)) => {
                // Ctrl-D or a closed stdin
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Ok(None)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    #[inline]
    fn send(&mut self, message: &str) -> Result<()> {
        println!("{} {}\n", style("Assistant:").green().bold(), message);
        Ok(())
    }
}
