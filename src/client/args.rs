//! Client command-line surface (SPEC_FULL.md §6 "CLI"): just the server
//! address to connect to, everything else is driven interactively through
//! the shell once connected.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "taskmaster-client", version, about = "Job-control supervisor operator shell")]
pub struct Args {
    /// Address of the daemon to connect to.
    #[arg(short = 'a', long = "addr", default_value = tcl::SOCKET_ADDRESS)]
    pub addr: String,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_server_socket_address() {
        let args = Args::try_parse_from(["taskmasterctl"]).unwrap();
        assert_eq!(args.addr, tcl::SOCKET_ADDRESS);
    }

    #[test]
    fn accepts_a_custom_address() {
        for flag in ["-a", "--addr"] {
            let args = Args::try_parse_from(["taskmasterctl", flag, "10.0.0.1:9000"]).unwrap();
            assert_eq!(args.addr, "10.0.0.1:9000");
        }
    }

    #[test]
    fn rejects_an_unknown_flag() {
        assert!(Args::try_parse_from(["taskmasterctl", "--bogus"]).is_err());
    }
}
