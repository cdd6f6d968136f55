/* -------------------------------------------------------------------------- */
/*                                   Import                                   */
/* -------------------------------------------------------------------------- */

use std::ops::Deref;

use tcl::{
    error::TaskmasterError,
    message::{receive, send, Request, Response},
};
use tokio::net::TcpStream;

/* -------------------------------------------------------------------------- */
/*                                   Struct                                   */
/* -------------------------------------------------------------------------- */
/// One parsed line of operator input (SPEC_FULL.md §6 "Interactive shell
/// commands"). `start`/`stop`/`restart` take `<name|all>`; the `all`
/// handling itself lives server-side, this just forwards the token.
pub enum CliCommand {
    Request(Request),
    Exit,
    Help,
}

impl CliCommand {
    pub fn from_client_input(user_input: &str) -> Result<CliCommand, TaskmasterError> {
        let arguments: Vec<&str> = user_input.split_ascii_whitespace().collect();
        if arguments.len() > 2 {
            return Err(TaskmasterError::Custom(format!("`{user_input}` contains too many arguments")));
        } else if arguments.is_empty() {
            return Err(TaskmasterError::Custom("your command contains nothing".to_owned()));
        }
        let command = arguments.first().expect("checked non-empty above").to_ascii_lowercase();

        let cli_command = if arguments.len() == 1 {
            match command.deref() {
                "exit" | "quit" => CliCommand::Exit,
                "help" => CliCommand::Help,
                "status" => CliCommand::Request(Request::Status),
                "reload" => CliCommand::Request(Request::Reload),
                _ => return Err(TaskmasterError::Custom(format!("'{command}' not found"))),
            }
        } else {
            let target = arguments.get(1).expect("checked len == 2 above").to_owned();
            match command.deref() {
                "start" => CliCommand::Request(Request::Start(target)),
                "stop" => CliCommand::Request(Request::Stop(target)),
                "restart" => CliCommand::Request(Request::Restart(target)),
                _ => return Err(TaskmasterError::Custom(format!("'{command}' not found"))),
            }
        };
        Ok(cli_command)
    }

    /// Runs the command; `Exit`/`Help` are handled locally, everything else
    /// is sent to the daemon and the reply read back.
    pub async fn execute(&self, stream: &mut TcpStream) -> Result<Response, TaskmasterError> {
        match self {
            CliCommand::Exit => {
                CliCommand::exit();
                unreachable!("exit() terminates the process");
            }
            CliCommand::Help => {
                CliCommand::help();
                Ok(Response::Success(String::new()))
            }
            CliCommand::Request(request) => {
                send(stream, request).await?;
                receive::<Response>(stream).await
            }
        }
    }

    pub fn exit() {
        std::process::exit(0);
    }

    pub fn help() {
        println!(
            "Taskmaster Client Commands:

    status                  Get the status of all programs
    start <name|all>         Start a program (or every program)
    stop <name|all>          Stop a program (or every program)
    restart <name|all>       Restart a program (or every program)
    reload                   Reload the configuration file
    exit | quit              Exit the client shell
    help                     Show this help message"
        )
    }
}
