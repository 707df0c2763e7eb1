//! CLI (Command Line Interface) mode
//!
//! Chat with the configured responder from a terminal, as if messages
//! arrived over WhatsApp from a local user. Also supports a one-shot ask.

use std::sync::Arc;

use nu_ansi_term::Style;
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, DefaultPrompt, DefaultPromptSegment, Emacs, KeyCode,
    KeyModifiers, Keybindings, MenuBuilder, Reedline, ReedlineEvent, ReedlineMenu, Signal,
    Suggestion,
};
use tracing::info;
use wa_core::{InboundMessage, Responder};

/// User id the CLI speaks as unless changed with `/user`
pub const DEFAULT_CLI_USER: &str = "cli";

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show help"),
    ("/user", "Switch the sender id (keeps a separate thread per id)"),
    ("/exit", "Quit"),
];

/// Completes slash commands at the start of the line
struct CommandCompleter;

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        COMMANDS
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

fn prompt_for(user_id: &str) -> DefaultPrompt {
    DefaultPrompt::new(
        DefaultPromptSegment::Basic(user_id.to_string()),
        DefaultPromptSegment::Empty,
    )
}

/// What the REPL should do with a line
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Exit,
    Help,
    SwitchUser(String),
    Unknown(String),
    Message,
}

fn parse_command(input: &str) -> Command {
    if !input.starts_with('/') {
        return Command::Message;
    }

    let mut parts = input.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match name.as_str() {
        "/exit" => Command::Exit,
        "/help" | "/?" => Command::Help,
        "/user" if !arg.is_empty() => Command::SwitchUser(arg.to_string()),
        _ => Command::Unknown(input.to_string()),
    }
}

/// Run CLI interactive mode
pub async fn run_cli(responder: Arc<dyn Responder>) -> anyhow::Result<()> {
    info!("Starting CLI mode");
    print_welcome();

    let mut keybindings = default_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(40))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let mut user_id = DEFAULT_CLI_USER.to_string();
    let mut prompt = prompt_for(&user_id);

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                match parse_command(input) {
                    Command::Exit => break,
                    Command::Help => print_help(),
                    Command::SwitchUser(id) => {
                        println!("\nNow chatting as {}\n", id);
                        user_id = id;
                        prompt = prompt_for(&user_id);
                    }
                    Command::Unknown(cmd) => {
                        eprintln!("\nUnknown command: {}. Use /help for available commands.\n", cmd);
                    }
                    Command::Message => {
                        let inbound = InboundMessage::new(&user_id, input);
                        let reply = responder.respond(&inbound).await;
                        println!("\n{}\n", reply);
                    }
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => break,
            Err(err) => {
                eprintln!("\nError: {}\n", err);
                break;
            }
        }
    }

    println!("\nBye!\n");
    Ok(())
}

/// One-shot mode: answer `text` as `user_id` and print the reply
pub async fn run_ask(responder: Arc<dyn Responder>, user_id: &str, text: &str) -> anyhow::Result<()> {
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("message is empty");
    }

    info!("Asking as {}", user_id);
    let reply = responder.respond(&InboundMessage::new(user_id, text)).await;
    println!("Assistant Response: {}", reply);
    Ok(())
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings
}

fn print_welcome() {
    println!();
    println!("wa-gateway CLI");
    println!("Type a message and press Enter. Commands: /help, /user <id>, /exit");
    println!();
}

fn print_help() {
    println!();
    println!("Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {} - {}", cmd, desc);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("hello"), Command::Message);
        assert_eq!(parse_command("/exit"), Command::Exit);
        assert_eq!(parse_command("/HELP"), Command::Help);
        assert_eq!(parse_command("/user wa_42"), Command::SwitchUser("wa_42".to_string()));
        assert_eq!(parse_command("/user"), Command::Unknown("/user".to_string()));
        assert_eq!(parse_command("/nope"), Command::Unknown("/nope".to_string()));
        assert_eq!(parse_command("/quit"), Command::Unknown("/quit".to_string()));
    }

    #[test]
    fn test_completer_filters_by_prefix() {
        let mut completer = CommandCompleter;
        let suggestions = completer.complete("/u", 2);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].value, "/user");
        assert!(completer.complete("hi", 2).is_empty());
    }
}
