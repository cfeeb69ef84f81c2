use crate::{
    Error,
    Result,
    model::Choice,
};
use std::str::FromStr;

pub const HELP: &str = "commands: create [name] | join <host> [name] | search [name] | \
pick <stone|paper|scissors> | leave | status | name <name> | quit";

/// A line typed at the interactive prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Create { name: Option<String> },
    Join { host: String, name: Option<String> },
    Search { name: Option<String> },
    Pick(Choice),
    Leave,
    Status,
    Name(String),
    Help,
    Quit,
}

fn rest(words: &[&str]) -> Option<String> {
    (!words.is_empty()).then(|| words.join(" "))
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((head, args)) = words.split_first() else {
            return Ok(Command::Help);
        };
        let usage = |text: &str| Error::Config(format!("usage: {text}"));
        match head.to_ascii_lowercase().as_str() {
            "create" => Ok(Command::Create { name: rest(args) }),
            "join" => match args.split_first() {
                Some((host, name)) => Ok(Command::Join {
                    host: host.to_string(),
                    name: rest(name),
                }),
                None => Err(usage("join <host chain id> [name]")),
            },
            "search" => Ok(Command::Search { name: rest(args) }),
            "pick" => match args {
                [choice] => Ok(Command::Pick(choice.parse()?)),
                _ => Err(usage("pick <stone|paper|scissors>")),
            },
            "leave" => Ok(Command::Leave),
            "status" => Ok(Command::Status),
            "name" => rest(args).map(Command::Name).ok_or_else(|| usage("name <name>")),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(Error::Config(format!("unknown command `{other}`; {HELP}"))),
        }
    }
}
