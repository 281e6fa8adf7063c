//! Interactive chat loop.
//!
//! Reads lines, routes slash commands, and pushes everything else through
//! [`ChatSession::send_message`]. Generic over the reader/writer so it can
//! be driven from tests.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use voicera_session::{ChatSession, Message, Role, SendOutcome};

const HELP: &str = "\
Commands:
  /contexts      list available contexts
  /use <id>      select a context
  /history       print the conversation so far
  /help          show this help
  /quit          leave the chat
Start a message with // to send a literal leading slash.";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Contexts,
    Use(String),
    History,
    Help,
    Quit,
    Message(String),
    Unknown(String),
}

/// Parse a line of input. Blank lines yield `None`.
///
/// Messages keep the text as typed; `//` escapes a leading slash.
pub fn parse_line(line: &str) -> Option<ReplCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with("//") {
        return Some(ReplCommand::Message(line.replacen("//", "/", 1)));
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return Some(ReplCommand::Message(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    Some(match name {
        "contexts" => ReplCommand::Contexts,
        "use" => ReplCommand::Use(arg.to_string()),
        "history" => ReplCommand::History,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    })
}

/// Render one transcript turn for the terminal.
pub fn render_turn(message: &Message) -> String {
    let who = match message.role() {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    format!("{who}> {}", message.content())
}

fn prompt(session: &ChatSession) -> String {
    match session.selected_context() {
        Some(context) => format!("[{context}] > "),
        None => "[no context] > ".to_string(),
    }
}

async fn write_line<W>(out: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

async fn print_contexts<W>(session: &ChatSession, contexts: Vec<String>, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if contexts.is_empty() {
        return write_line(out, "No contexts available.").await;
    }
    let selected = session.selected_context();
    for context in contexts {
        let marker = if selected.as_deref() == Some(context.as_str()) {
            "*"
        } else {
            " "
        };
        write_line(out, &format!("{marker} {context}")).await?;
    }
    Ok(())
}

/// Run the chat loop until `/quit` or end of input.
pub async fn run<R, W>(session: &ChatSession, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    if session.selected_context().is_none() {
        let contexts = session.ensure_contexts().await;
        print_contexts(session, contexts, out).await?;
        write_line(out, "Pick a context with /use <id>. Type /help for commands.").await?;
    }

    loop {
        out.write_all(prompt(session).as_bytes()).await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            write_line(out, "").await?;
            break;
        };

        let Some(command) = parse_line(&line) else {
            continue;
        };

        match command {
            ReplCommand::Quit => break,
            ReplCommand::Help => write_line(out, HELP).await?,
            ReplCommand::Contexts => {
                let contexts = session.refresh_contexts().await;
                print_contexts(session, contexts, out).await?;
            }
            ReplCommand::History => {
                let transcript = session.transcript();
                if transcript.is_empty() {
                    write_line(out, "(no messages yet)").await?;
                }
                for message in transcript.iter() {
                    write_line(out, &render_turn(message)).await?;
                }
            }
            ReplCommand::Use(context) => {
                if context.is_empty() {
                    write_line(out, "usage: /use <id>").await?;
                    continue;
                }
                let known = session.ensure_contexts().await;
                if !known.is_empty() && !known.contains(&context) {
                    write_line(out, &format!("note: '{context}' is not in the context list")).await?;
                }
                session.select_context(context);
            }
            ReplCommand::Unknown(name) => {
                write_line(out, &format!("unknown command /{name}; try /help")).await?;
            }
            ReplCommand::Message(text) => {
                let outcome = session.send_message(&text).await;
                report(session, &outcome, out).await?;
            }
        }
    }

    Ok(())
}

/// Print the assistant turn for a send, or a hint when nothing was sent.
pub async fn report<W>(session: &ChatSession, outcome: &SendOutcome, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match outcome {
        SendOutcome::Rejected(reason) => {
            write_line(out, &format!("(not sent: {reason})")).await?;
        }
        SendOutcome::Answered | SendOutcome::Failed(_) => {
            if let SendOutcome::Failed(e) = outcome {
                tracing::warn!(error = %e, "Inference request failed");
            }
            if let Some(reply) = session.transcript().last() {
                write_line(out, &render_turn(reply)).await?;
            }
        }
    }
    Ok(())
}
