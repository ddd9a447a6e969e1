//! Interactive trading session for a running server.
//!
//! Forwards stdin lines to the server as commands and prints every server
//! line (responses and trade broadcasts) to stdout. `EXIT` ends the
//! session locally; everything else is sent verbatim.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub async fn run(addr: &str) -> io::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    println!("Connected to {addr}. Commands:");
    println!("  BUY <quantity> <price>");
    println!("  SELL <quantity> <price>");
    println!("  CANCEL <order_id>");
    println!("  STATUS");
    println!("  EXIT");

    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let mut input_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                match line? {
                    Some(message) => println!("{message}"),
                    None => {
                        println!("Server closed the connection");
                        return Ok(());
                    }
                }
            }
            line = input_lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "EXIT" {
                    return Ok(());
                }
                write_half.write_all(line.as_bytes()).await?;
                write_half.write_all(b"\n").await?;
            }
        }
    }
}
