//! memsync CLI Client
//!
//! Interactive command-line client for the memsyncd command port.
//!
//! # Usage
//!
//! ```bash
//! # Connect to local daemon
//! memsync
//!
//! # Connect to remote daemon
//! memsync --host node-b --port 7380
//!
//! # Execute single command
//! memsync -c "GET test"
//! ```

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// memsync Command Line Interface
#[derive(Parser, Debug)]
#[command(name = "memsync")]
#[command(author, version, about = "memsync CLI - replicated key-value store client")]
struct Args {
    /// Daemon hostname
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "MEMSYNC_HOST")]
    host: String,

    /// Daemon command port
    #[arg(short, long, default_value = "7380", env = "MEMSYNC_PORT")]
    port: u16,

    /// Execute command and exit
    #[arg(short, long)]
    command: Option<String>,

    /// Quiet mode (no banner)
    #[arg(short, long)]
    quiet: bool,
}

/// A decoded server reply
#[derive(Debug, PartialEq)]
enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Nil,
    Array(Vec<Reply>),
}

/// Connection to the command port
struct Client {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: &str) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).with_context(|| format!("Failed to connect to {}", addr))?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            writer: stream,
            reader,
        })
    }

    fn execute(&mut self, cmd: &str) -> Result<Reply> {
        writeln!(self.writer, "{}", cmd)?;
        self.writer.flush()?;
        read_reply(&mut self.reader)
    }
}

fn read_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        bail!("Connection closed by server");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_reply(reader: &mut impl BufRead) -> Result<Reply> {
    let line = read_line(reader)?;
    let (kind, rest) = line.split_at(line.chars().next().map_or(0, char::len_utf8));

    match kind {
        "+" => Ok(Reply::Status(rest.to_string())),
        "-" => Ok(Reply::Error(rest.to_string())),
        ":" => Ok(Reply::Integer(
            rest.parse().with_context(|| format!("Bad integer reply: {}", line))?,
        )),
        "$" if rest == "-1" => Ok(Reply::Nil),
        "$" => {
            let len: usize = rest
                .parse()
                .with_context(|| format!("Bad bulk length: {}", line))?;
            let mut data = vec![0u8; len + 2];
            reader.read_exact(&mut data)?;
            data.truncate(len);
            Ok(Reply::Bulk(data))
        }
        "*" => {
            let count: usize = rest
                .parse()
                .with_context(|| format!("Bad array length: {}", line))?;
            (0..count)
                .map(|_| read_reply(reader))
                .collect::<Result<Vec<_>>>()
                .map(Reply::Array)
        }
        _ => bail!("Unexpected reply: {}", line),
    }
}

fn render(reply: &Reply) -> String {
    match reply {
        Reply::Status(status) => status.green().to_string(),
        Reply::Error(message) => message.red().to_string(),
        Reply::Integer(n) => format!("(integer) {}", n).yellow().to_string(),
        Reply::Nil => "(nil)".dimmed().to_string(),
        Reply::Bulk(data) => {
            let text = String::from_utf8_lossy(data);
            // ENTRY, INFO and PEERS answer with JSON
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) if json.is_object() || json.is_array() => {
                    serde_json::to_string_pretty(&json).unwrap_or_else(|_| text.into_owned())
                }
                _ => format!("\"{}\"", text),
            }
        }
        Reply::Array(items) if items.is_empty() => "(empty list)".dimmed().to_string(),
        Reply::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}) {}", i + 1, render(item)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let addr = format!("{}:{}", args.host, args.port);
    let mut client = Client::connect(&addr)?;

    // Single command mode
    if let Some(cmd) = args.command {
        let reply = client.execute(&cmd)?;
        println!("{}", render(&reply));
        if matches!(reply, Reply::Error(_)) {
            std::process::exit(1);
        }
        return Ok(());
    }

    if !args.quiet {
        println!(
            "{}",
            format!(
                r#"
  memsync CLI
  Connected to {}
  Type 'help' for commands, 'quit' to exit
"#,
                addr
            )
            .cyan()
        );
    }

    // Interactive mode
    let mut rl = DefaultEditor::new()?;
    let history_path = dirs_next::home_dir()
        .map(|p| p.join(".memsync_history"))
        .unwrap_or_default();

    let _ = rl.load_history(&history_path);

    loop {
        let prompt = format!("{}> ", "memsync".green());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Handle local commands
                match line.to_uppercase().as_str() {
                    "QUIT" | "EXIT" => {
                        let _ = client.execute("QUIT");
                        break;
                    }
                    "HELP" => {
                        print_help();
                        continue;
                    }
                    "CLEAR" => {
                        print!("\x1B[2J\x1B[1;1H");
                        continue;
                    }
                    _ => {}
                }

                // Execute remote command
                match client.execute(line) {
                    Ok(reply) => println!("{}", render(&reply)),
                    Err(e) => {
                        eprintln!("{} {}", "Error:".red(), e);

                        // Try to reconnect
                        match Client::connect(&addr) {
                            Ok(fresh) => {
                                client = fresh;
                                println!("{}", "Reconnected.".yellow());
                            }
                            Err(_) => {
                                eprintln!("{}", "Connection lost.".red());
                                break;
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

fn print_help() {
    println!(
        r#"
{}

{}
  GET <key>                              Read a key
  SET <key> <value>                      Write a key (quote values with spaces)
  DEL <key>                              Delete a key
  ENTRY <key>                            Show version stamp and tombstone state
  KEYS [pattern]                         List live keys
  LIST [folder] [RECURSIVE]              List live keys of a folder

{}
  PEERS                                  List sync sessions
  SYNC                                   Start a sync round on every session
  SYNC <key | folder/>                   Exchange one key or folder with every peer

{}
  PING                                   Check connection
  INFO                                   Replica information
  QUIT                                   Close connection

{}
  help                                   Show this help
  clear                                  Clear screen
  quit/exit                              Exit CLI
"#,
        "memsync Commands".cyan().bold(),
        "Keys".yellow().bold(),
        "Replication".yellow().bold(),
        "Server".yellow().bold(),
        "Local".yellow().bold(),
    );
}

// Minimal dirs_next replacement for home directory
mod dirs_next {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &str) -> Reply {
        read_reply(&mut Cursor::new(raw.as_bytes())).unwrap()
    }

    #[test]
    fn test_simple_replies() {
        assert_eq!(parse("+OK 1@abc\r\n"), Reply::Status("OK 1@abc".into()));
        assert_eq!(parse("+PONG\r\n"), Reply::Status("PONG".into()));
        assert_eq!(
            parse("-ERR INVALID_KEY key is empty\r\n"),
            Reply::Error("ERR INVALID_KEY key is empty".into())
        );
        assert_eq!(parse(":2\r\n"), Reply::Integer(2));
        assert_eq!(parse("$-1\r\n"), Reply::Nil);
    }

    #[test]
    fn test_bulk_with_newline() {
        assert_eq!(parse("$5\r\na\r\nbc\r\n"), Reply::Bulk(b"a\r\nbc".to_vec()));
    }

    #[test]
    fn test_array_of_bulk() {
        assert_eq!(
            parse("*2\r\n$1\r\na\r\n$4\r\ntest\r\n"),
            Reply::Array(vec![Reply::Bulk(b"a".to_vec()), Reply::Bulk(b"test".to_vec())])
        );
    }

    #[test]
    fn test_closed_connection() {
        assert!(read_reply(&mut Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn test_render_nil_and_value() {
        colored::control::set_override(false);
        assert_eq!(render(&Reply::Nil), "(nil)");
        assert_eq!(render(&Reply::Bulk(b"present".to_vec())), "\"present\"");
        assert_eq!(render(&Reply::Integer(3)), "(integer) 3");
    }
}
