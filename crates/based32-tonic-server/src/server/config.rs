use anyhow::bail;
use clap::Parser;

/// Runtime configuration for the transcription server binary.
///
/// These settings control the concurrency and buffering behavior of the
/// service. All values are parsed from CLI arguments or environment
/// variables, with defaults suitable for production.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "based32-tonic-server",
    version,
    about = "A gRPC service for checksummed human-readable transcription"
)]
pub struct CliArgs {
    /// Number of worker tasks processing encode and decode calls
    /// concurrently.
    ///
    /// Each worker owns its own request queue and processes one call at a
    /// time; requests are assigned across workers in round-robin order.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = num_cpus::get())]
    pub num_workers: usize,

    /// Capacity of each worker's request queue.
    ///
    /// The dispatcher relays one request per in-flight call, so a depth of
    /// one keeps at-most-one queued request per worker and surfaces
    /// backpressure to the stream instead of buffering unboundedly.
    ///
    /// Environment variable: `WORK_REQUEST_BUFFER_SIZE`
    #[arg(long, env = "WORK_REQUEST_BUFFER_SIZE", default_value_t = 1)]
    pub work_request_buffer_size: usize,

    /// Capacity of the response buffer between the dispatcher and each
    /// gRPC stream.
    ///
    /// Lower values increase backpressure responsiveness; higher values
    /// let more completed responses pipeline while a client is slow to
    /// read.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for each worker to acknowledge shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/based32-uds.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub num_workers: usize,
    pub work_request_buffer_size: usize,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: u64,
    pub server_addr: String,
    pub uds: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.work_request_buffer_size == 0 {
            bail!("WORK_REQUEST_BUFFER_SIZE must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            num_workers: args.num_workers,
            work_request_buffer_size: args.work_request_buffer_size,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: args.shutdown_timeout,
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CliArgs {
        CliArgs::parse_from(["based32-tonic-server"])
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut args = args();
        args.num_workers = 0;
        assert!(ServerConfig::try_from(args).is_err());
    }

    #[test]
    fn defaults_validate() {
        assert!(ServerConfig::try_from(args()).is_ok());
    }
}
