use bytes::BytesMut;
use clap::Parser;
use prometheus::HistogramTimer;
use std::collections::HashSet;
use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use dns_delegate::cache::SharedCache;
use dns_delegate::delegate::Upstream;
use dns_delegate::net::{read_tcp_bytes, send_tcp_bytes, send_udp_bytes_to, TcpError};
use dns_delegate::process::process_query;
use dns_wire::serialise;
use dns_wire::types::Message;

mod metrics;
mod settings;

use metrics::*;
use settings::Settings;

/// Arguments for `listen_udp_task` and `listen_tcp_task`.
#[derive(Debug, Clone)]
struct ListenArgs {
    udp_truncate_length: usize,
    query_timeout: Duration,
    upstreams: Arc<Vec<Upstream>>,
    cache: SharedCache,
}

/// Parse one request and run it through the processor.  `None` means
/// nothing should be sent back at all.
async fn handle_raw_message(args: &ListenArgs, buf: &[u8]) -> Option<Message> {
    let res = Message::from_octets(buf);
    tracing::debug!(message = ?res, "got message");

    match res {
        Ok(msg) => {
            if msg.header.is_response {
                // Do not respond to response messages: an inbound
                // message could spoof its source address / port to
                // match ours, and so make the server respond to
                // itself, which triggers another response, etc
                None
            } else {
                let response = process_query(
                    &msg,
                    &args.cache,
                    &args.upstreams,
                    args.query_timeout,
                    Instant::now(),
                )
                .await;
                Some(response)
            }
        }

        // An attacker could craft an incomplete message with a
        // spoofed source, making the server respond to it here, but
        // this is fine so long as (1) the response we send is valid
        // and (2) we don't reply to a valid message which is a
        // response.
        Err(err) => err.id().map(Message::make_format_error_response),
    }
}

/// Serialise a response for UDP.  A response which does not fit in a
/// datagram is replaced wholesale by an empty one with the TC flag
/// set, which the client takes as "retry over TCP".  The comparison
/// is against the encoded octet count.
fn serialise_for_udp(
    message: Message,
    truncate_length: usize,
) -> Result<(Message, BytesMut), serialise::Error> {
    let octets = message.to_octets()?;
    if octets.len() > truncate_length {
        let truncated = message.make_truncated();
        let octets = truncated.to_octets()?;
        Ok((truncated, octets))
    } else {
        Ok((message, octets))
    }
}

async fn listen_udp_task(args: ListenArgs, socket: UdpSocket) {
    let (tx, mut rx) = mpsc::channel::<(Message, SocketAddr, HistogramTimer)>(32);
    let mut buf = vec![0u8; 512];

    loop {
        tokio::select! {
            Ok((size, peer)) = socket.recv_from(&mut buf) => {
                tracing::info!(?peer, "UDP request");
                DNS_REQUESTS_TOTAL.with_label_values(&["udp"]).inc();
                let bytes = BytesMut::from(&buf[..size]);
                let reply = tx.clone();
                let args = args.clone();
                tokio::spawn(async move {
                    let response_timer = DNS_RESPONSE_TIME_SECONDS
                        .with_label_values(&["udp"])
                        .start_timer();
                    if let Some(response_message) = handle_raw_message(&args, bytes.as_ref()).await {
                        if let Err(error) = reply.send((response_message, peer, response_timer)).await {
                            tracing::debug!(?peer, ?error, "UDP send error");
                        }
                    }
                });
            }

            Some((message, peer, response_timer)) = rx.recv() => {
                match serialise_for_udp(message, args.udp_truncate_length) {
                    Ok((message, serialised)) => {
                        DNS_RESPONSES_TOTAL.with_label_values(&[
                            "udp",
                            &message.header.is_truncated.to_string(),
                            &message.header.rcode.to_string(),
                        ]).inc();
                        if let Err(error) = send_udp_bytes_to(&socket, peer, &serialised).await {
                            tracing::debug!(?peer, ?error, "UDP send error");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(?peer, ?error, "could not serialise message");
                    }
                }
                response_timer.observe_duration();
            }
        }
    }
}

/// Serve one TCP connection: length-prefixed requests in,
/// length-prefixed responses out, until the client goes away.
async fn handle_tcp_connection(args: ListenArgs, mut stream: TcpStream, peer: SocketAddr) {
    loop {
        let (response, close_after) = match read_tcp_bytes(&mut stream).await {
            Ok(bytes) => {
                DNS_REQUESTS_TOTAL.with_label_values(&["tcp"]).inc();
                let response_timer = DNS_RESPONSE_TIME_SECONDS
                    .with_label_values(&["tcp"])
                    .start_timer();
                let response = handle_raw_message(&args, bytes.as_ref()).await;
                response_timer.observe_duration();
                (response, false)
            }
            Err(TcpError::TooShort {
                id,
                expected,
                actual,
            }) => {
                tracing::debug!(?peer, %expected, %actual, "undersized TCP message");
                (id.map(Message::make_format_error_response), true)
            }
            Err(TcpError::IO { error, .. }) => {
                // includes the client closing the connection between
                // messages
                tracing::debug!(?peer, ?error, "TCP read error");
                break;
            }
        };

        if let Some(message) = response {
            match message.to_octets() {
                Ok(serialised) => {
                    DNS_RESPONSES_TOTAL
                        .with_label_values(&["tcp", "false", &message.header.rcode.to_string()])
                        .inc();
                    if let Err(error) = send_tcp_bytes(&mut stream, &serialised).await {
                        tracing::debug!(?peer, ?error, "TCP send error");
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(?peer, ?message, ?error, "could not serialise message");
                }
            }
        }

        if close_after {
            break;
        }
    }
}

async fn listen_tcp_task(args: ListenArgs, socket: TcpListener) {
    loop {
        match socket.accept().await {
            Ok((stream, peer)) => {
                tracing::info!(?peer, "TCP connection");
                let args = args.clone();
                tokio::spawn(handle_tcp_connection(args, stream, peer));
            }
            Err(error) => tracing::debug!(?error, "TCP accept error"),
        }
    }
}

fn prune_cache_and_update_metrics(cache: &SharedCache) {
    let (overflow, current_size, expired, pruned) = cache.prune();

    CACHE_SIZE.set(current_size.try_into().unwrap_or(i64::MAX));
    CACHE_EXPIRED_TOTAL.inc_by(expired.try_into().unwrap_or(u64::MAX));
    CACHE_PRUNED_TOTAL.inc_by(pruned.try_into().unwrap_or(u64::MAX));

    if overflow {
        CACHE_OVERFLOW_COUNT.inc();
    }

    if expired > 0 || pruned > 0 {
        tracing::info!(%expired, %pruned, "pruned cache");
    }
}

/// Delete expired cache entries every 5 minutes.
///
/// Always removes all expired entries, and then if the cache is still
/// too big prunes it down to size.
async fn prune_cache_task(cache: SharedCache) {
    loop {
        sleep(Duration::from_secs(60 * 5)).await;
        prune_cache_and_update_metrics(&cache);
    }
}

fn begin_logging() {
    let log_format = if let Ok(var) = env::var("RUST_LOG_FORMAT") {
        let mut set = HashSet::new();
        for s in var.split(',') {
            set.insert(s.to_string());
        }
        set
    } else {
        HashSet::new()
    };

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("pretty") {
        if log_format.contains("no-time") {
            logger.pretty().without_time().init();
        } else {
            logger.pretty().init();
        }
    } else if log_format.contains("compact") {
        if log_format.contains("no-time") {
            logger.compact().without_time().init();
        } else {
            logger.compact().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Clone, Parser)]
/// A delegating, caching DNS resolver for small networks.
///
/// delegated answers queries from its cache when it can, and
/// otherwise asks all of the configured upstream nameservers in
/// parallel, taking the first good answer.  It serves no
/// authoritative zones of its own.
///
/// Prometheus metrics are served at
/// "http://{metrics_interface}/metrics"
struct Args {
    /// Interface to listen on (in `ip:port` form)
    #[clap(short, long, value_parser, default_value_t = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 53)), env = "DELEGATED_INTERFACE")]
    interface: SocketAddr,

    /// Interface to listen on (in `ip:port` form) to serve Prometheus metrics
    #[clap(long, value_parser, default_value_t = SocketAddr::from((Ipv4Addr::LOCALHOST, 9420)), env = "DELEGATED_METRICS_INTERFACE")]
    metrics_interface: SocketAddr,

    /// Path to a settings file naming the upstream nameservers
    #[clap(short, long, value_parser, env = "DELEGATED_CONFIG")]
    config: Option<String>,

    /// How many records to hold in the cache
    #[clap(
        short = 's',
        long,
        value_parser,
        default_value_t = 512,
        env = "DELEGATED_CACHE_SIZE"
    )]
    cache_size: usize,

    /// How long to wait, in seconds, for the upstream nameservers
    /// before failing a query
    #[clap(
        short = 't',
        long,
        value_parser,
        default_value_t = 5,
        env = "DELEGATED_QUERY_TIMEOUT"
    )]
    query_timeout: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    begin_logging();

    let settings = match &args.config {
        Some(path) => match Settings::new(path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::error!(?error, "could not load settings");
                process::exit(1);
            }
        },
        None => Settings::default(),
    };

    let upstreams = settings.upstreams();
    if upstreams.is_empty() {
        tracing::warn!("no upstream nameservers configured - queries which miss the cache will fail");
    }

    tracing::info!(interface = %args.interface, "binding DNS UDP socket");
    let udp = match UdpSocket::bind(args.interface).await {
        Ok(s) => s,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS UDP socket");
            process::exit(1);
        }
    };

    tracing::info!(interface = %args.interface, "binding DNS TCP socket");
    let tcp = match TcpListener::bind(args.interface).await {
        Ok(s) => s,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS TCP socket");
            process::exit(1);
        }
    };

    let listen_args = ListenArgs {
        udp_truncate_length: settings.udp_truncate_length,
        query_timeout: Duration::from_secs(args.query_timeout),
        upstreams: Arc::new(upstreams),
        cache: SharedCache::with_desired_size(std::cmp::max(1, args.cache_size)),
    };

    tokio::spawn(listen_tcp_task(listen_args.clone(), tcp));
    tokio::spawn(listen_udp_task(listen_args.clone(), udp));
    tokio::spawn(prune_cache_task(listen_args.cache));

    tracing::info!(interface = %args.metrics_interface, "binding HTTP TCP socket");
    if let Err(error) = serve_prometheus_endpoint_task(args.metrics_interface).await {
        tracing::error!(?error, "could not bind HTTP TCP socket");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_wire::types::test_util::*;
    use dns_wire::types::*;

    #[test]
    fn serialise_for_udp_leaves_small_responses_alone() {
        let message = Message::from_question(
            1,
            Question {
                name: domain("www.example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        )
        .make_response();

        let (out, octets) = serialise_for_udp(message.clone(), 512).unwrap();
        assert_eq!(message, out);
        assert!(octets.len() <= 512);
        assert!(!out.header.is_truncated);
    }

    #[test]
    fn serialise_for_udp_truncates_oversized_responses() {
        let mut message = Message::from_question(
            1,
            Question {
                name: domain("www.example.com."),
                qtype: QueryType::Record(RecordType::TXT),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        )
        .make_response();
        // pad the response past the 512-octet threshold
        while message.to_octets().unwrap().len() <= 512 {
            message.answers.push(ResourceRecord {
                name: domain("www.example.com."),
                rtype_with_data: RecordTypeWithData::TXT {
                    strings: vec![charstring(&[b'x'; 50])],
                },
                rclass: RecordClass::IN,
                ttl: 300,
            });
        }

        let (out, octets) = serialise_for_udp(message, 512).unwrap();
        assert!(out.header.is_truncated);
        assert_eq!(12, octets.len());
        assert_eq!(Vec::<Question>::new(), out.questions);
        assert_eq!(Vec::<ResourceRecord>::new(), out.answers);

        // the emitted header has every count zeroed
        let reparsed = Message::from_octets(&octets).unwrap();
        assert!(reparsed.header.is_truncated);
        assert_eq!(Vec::<Question>::new(), reparsed.questions);
    }
}
