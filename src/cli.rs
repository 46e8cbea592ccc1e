// CLI definitions using clap

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "walkd")]
#[command(author, version, about = "Heartbeat-driven daemon for the Sperax RM01 walking pad")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Daemon address for client subcommands
    #[arg(long, global = true, default_value = "127.0.0.1:7463")]
    pub addr: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Hold the BLE connection and serve heartbeats
    Daemon {
        /// Advertised BLE name of the pad
        #[arg(long, default_value = "RM01")]
        device: String,

        /// Port to listen on
        #[arg(long, default_value_t = crate::daemon::DEFAULT_PORT)]
        port: u16,
    },

    /// Read a hook event from stdin and forward it to the daemon
    ///
    /// Wire this into the coding-agent hook config; it is fire-and-forget
    /// and exits quickly whether or not the daemon is up.
    Hook,

    /// Start the belt
    Start {
        /// Speed in km/h (0.5-6.0)
        #[arg(default_value_t = 2.0)]
        speed: f64,
    },

    /// Stop the belt
    Stop,

    /// Change belt speed
    Speed {
        /// Speed in km/h (0.5-6.0)
        speed: f64,
    },

    /// Show daemon state
    Status,
}
