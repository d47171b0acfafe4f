use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use futures_util::future::try_join_all;
use serde::Serialize;
use tokio::net::UdpSocket;

use udp_request_log::udp_log::record::ParsedRecord;

/// Largest datagram accepted; longer records are truncated by the OS.
const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Parser)]
#[command(name = "udp-log-collector")]
#[command(about = "Receive and print UDP request log records", long_about = None)]
struct Cli {
    /// UDP ports to listen on
    #[arg(required = true)]
    ports: Vec<u16>,

    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Print one JSON object per record
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    port: u16,
    from: SocketAddr,
    #[serde(flatten)]
    record: &'a ParsedRecord,
    checksum_ok: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut sockets = Vec::with_capacity(cli.ports.len());
    for &port in &cli.ports {
        let socket = UdpSocket::bind(SocketAddr::new(cli.bind, port)).await?;
        println!("Listening on {}", socket.local_addr()?);
        sockets.push(socket);
    }

    let json = cli.json;
    try_join_all(sockets.into_iter().map(|socket| listen(socket, json))).await?;
    Ok(())
}

async fn listen(socket: UdpSocket, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let port = socket.local_addr()?.port();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        let record = match ParsedRecord::parse(&buf[..len]) {
            Ok(record) => record,
            Err(e) => {
                eprintln!(
                    "Malformed record on port {port} from {from}: {e}: {:?}",
                    String::from_utf8_lossy(&buf[..len])
                );
                continue;
            }
        };

        let checksum_ok = record.checksum_matches();
        if json {
            let line = JsonLine {
                port,
                from,
                record: &record,
                checksum_ok,
            };
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("Received on port {port} from {from}");
            println!("    Method: {}", record.method);
            println!("    URI:    {}", record.path);
            println!(
                "    CRC32:  0x{:08x} ({})",
                record.checksum,
                if checksum_ok { "ok" } else { "mismatch" }
            );
        }
    }
}
