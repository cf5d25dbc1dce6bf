//! `basedcli`: encode or decode one value against a running transcription
//! server.

use based32_tonic_client::TranscribeClient;
use clap::{ArgGroup, Parser};
use core::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "basedcli",
    version,
    about = "Encode and decode checksummed transcription strings over gRPC",
    group(ArgGroup::new("op").required(true))
)]
struct CliArgs {
    /// Address of the transcription server.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("http://127.0.0.1:50051"))]
    server_addr: String,

    /// Hex-encoded bytes to encode into a transcription string.
    #[arg(short = 'e', long, group = "op", value_name = "HEX")]
    encode: Option<String>,

    /// Transcription string to decode back into bytes (printed as hex).
    #[arg(short = 'd', long, group = "op", value_name = "ENCODED")]
    decode: Option<String>,

    /// Seconds to wait for a response before giving up.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 5)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    // Validate the payload before dialing anything.
    let payload = args.encode.as_deref().map(hex::decode).transpose()?;

    let client =
        TranscribeClient::connect(args.server_addr, Duration::from_secs(args.timeout)).await?;

    if let Some(data) = payload {
        println!("{}", client.encode(data).await?);
    } else if let Some(encoded) = args.decode {
        println!("{}", hex::encode(client.decode(encoded).await?));
    }

    client.stop();
    Ok(())
}
