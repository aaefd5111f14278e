//! Plain-text replies to four-letter words.

use std::fmt::Write;

use crate::protocol::FourLetterWord;
use crate::server::{ServerState, ServerStats};

/// Version string reported by `srvr`, `mntr` and `envi`.
pub const VERSION: &str = concat!("zknode-", env!("CARGO_PKG_VERSION"));

pub fn respond(state: &ServerState, word: FourLetterWord) -> String {
    match word {
        FourLetterWord::Ruok => "imok".to_string(),
        FourLetterWord::Srvr | FourLetterWord::Stat => summary(&state.stats()),
        FourLetterWord::Mntr => monitor(&state.stats()),
        FourLetterWord::Conf => configuration(state),
        FourLetterWord::Envi => environment(),
    }
}

fn summary(stats: &ServerStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Zookeeper version: {}", VERSION);
    let _ = writeln!(out, "Latency min/avg/max: 0/0/0");
    let _ = writeln!(out, "Received: {}", stats.packets_received);
    let _ = writeln!(out, "Sent: {}", stats.packets_sent);
    let _ = writeln!(out, "Connections: {}", stats.connection_count);
    let _ = writeln!(out, "Outstanding: 0");
    let _ = writeln!(out, "Zxid: 0x{:x}", stats.last_zxid);
    let _ = writeln!(out, "Mode: standalone");
    let _ = writeln!(out, "Node count: {}", stats.znode_count);
    out
}

fn monitor(stats: &ServerStats) -> String {
    let rows: [(&str, String); 12] = [
        ("zk_version", VERSION.to_string()),
        ("zk_avg_latency", "0".into()),
        ("zk_max_latency", "0".into()),
        ("zk_min_latency", "0".into()),
        ("zk_packets_received", stats.packets_received.to_string()),
        ("zk_packets_sent", stats.packets_sent.to_string()),
        ("zk_num_alive_connections", stats.connection_count.to_string()),
        ("zk_outstanding_requests", "0".into()),
        ("zk_server_state", "standalone".into()),
        ("zk_znode_count", stats.znode_count.to_string()),
        ("zk_watch_count", stats.watch_count.to_string()),
        ("zk_ephemerals_count", stats.ephemeral_count.to_string()),
    ];
    let mut out = String::new();
    for (key, value) in rows {
        let _ = writeln!(out, "{}\t{}", key, value);
    }
    let _ = writeln!(out, "zk_session_count\t{}", stats.session_count);
    let _ = writeln!(out, "zk_uptime\t{}", stats.uptime.as_millis());
    out
}

fn configuration(state: &ServerState) -> String {
    let config = &state.config;
    let mut out = String::new();
    let _ = writeln!(out, "clientPort={}", config.listener.port);
    let _ = writeln!(out, "clientPortAddress={}", config.listener.host);
    let _ = writeln!(out, "maxClientCnxns={}", config.listener.max_connections);
    let _ = writeln!(out, "tickTime={}", config.session.tick_time_ms);
    let _ = writeln!(out, "minSessionTimeout={}", config.session.min_timeout().as_millis());
    let _ = writeln!(out, "maxSessionTimeout={}", config.session.max_timeout().as_millis());
    let _ = writeln!(out, "serverId={}", config.server_id);
    out
}

fn environment() -> String {
    let mut out = String::from("Environment:\n");
    let _ = writeln!(out, "zookeeper.version={}", VERSION);
    let _ = writeln!(out, "os.name={}", std::env::consts::OS);
    let _ = writeln!(out, "os.arch={}", std::env::consts::ARCH);
    if let Ok(dir) = std::env::current_dir() {
        let _ = writeln!(out, "user.dir={}", dir.display());
    }
    out
}
