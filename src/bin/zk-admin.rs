use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use zknode::protocol::FourLetterWord;

#[derive(Parser)]
#[command(name = "zk-admin")]
#[command(about = "Send four-letter admin words to a zknode server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:2181")]
    server: String,

    /// Seconds to wait for the reply.
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Liveness check (expects "imok")
    Ruok,
    /// Server summary
    Srvr,
    /// Server summary (legacy alias)
    Stat,
    /// Monitoring values, one per line
    Mntr,
    /// Effective configuration
    Conf,
    /// Server environment
    Envi,
}

impl Commands {
    fn word(&self) -> FourLetterWord {
        match self {
            Commands::Ruok => FourLetterWord::Ruok,
            Commands::Srvr => FourLetterWord::Srvr,
            Commands::Stat => FourLetterWord::Stat,
            Commands::Mntr => FourLetterWord::Mntr,
            Commands::Conf => FourLetterWord::Conf,
            Commands::Envi => FourLetterWord::Envi,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let word = cli.command.word();

    let exchange = async {
        let mut stream = TcpStream::connect(&cli.server).await?;
        stream.write_all(word.as_str().as_bytes()).await?;
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await?;
        Ok::<_, std::io::Error>(reply)
    };

    let reply = match tokio::time::timeout(Duration::from_secs(cli.timeout), exchange).await {
        Ok(reply) => reply?,
        Err(_) => {
            eprintln!("Error: no reply from {} within {}s", cli.server, cli.timeout);
            std::process::exit(1);
        }
    };

    if reply.is_empty() {
        eprintln!("Error: server closed the connection without replying");
        std::process::exit(1);
    }
    print!("{}", reply);
    if !reply.ends_with('\n') {
        println!();
    }
    Ok(())
}
