/* -------------------------------------------------------------------------- */
/*                                   Import                                   */
/* -------------------------------------------------------------------------- */

use args::Args;
use cli::Cli;
use command::CliCommand;
use std::time::Duration;
use tcl::message::Response;
use tokio::net::TcpStream;
use tokio::time::sleep;

/* -------------------------------------------------------------------------- */
/*                                   Module                                   */
/* -------------------------------------------------------------------------- */
mod args;
mod cli;
mod command;
mod history;

/* -------------------------------------------------------------------------- */
/*                                    Main                                    */
/* -------------------------------------------------------------------------- */

#[tokio::main]
async fn main() {
    let args = Args::parse_args();
    println!("Trying to connect to the server at {}", args.addr);
    let mut stream = loop {
        match TcpStream::connect(&args.addr).await {
            Ok(stream) => break stream,
            Err(error) => {
                eprintln!("can't connect: {error}");
                sleep(Duration::from_secs(2)).await;
            }
        }
    };

    CliCommand::help();
    let mut shell = Cli::new();
    loop {
        match shell.read_line() {
            Ok(user_input) => process_user_input(user_input, &mut stream).await,
            Err(error) => {
                if error.is_unexpected_end_of_file() {
                    println!();
                } else {
                    eprintln!("Error reading line: {error}");
                }
                return;
            }
        }
    }
}

async fn process_user_input(user_input: String, stream: &mut TcpStream) {
    let trimmed = user_input.trim();
    if trimmed.is_empty() {
        return;
    }

    match CliCommand::from_client_input(trimmed) {
        Ok(command) => match command.execute(stream).await {
            Ok(response) => print_response(&response),
            Err(error) => eprintln!("error while executing command: {error}"),
        },
        Err(error) => {
            eprintln!("error while parsing command: {error}. Type 'help' for more info or 'exit' to close.");
        }
    }
}

fn print_response(response: &Response) {
    match response {
        Response::Success(message) if message.is_empty() => {} // the local `help` command's placeholder reply
        other => print!("{other}"),
    }
}
