//! Delegation of unanswered questions to the configured upstream
//! nameservers.
//!
//! The request is serialised once and every upstream is probed in
//! parallel, each from its own ephemeral UDP socket.  An upstream
//! whose reply arrives truncated is asked again over TCP.  Replies
//! which cannot be parsed, or which do not correspond to the request,
//! are dropped: another upstream may still answer.

use bytes::Bytes;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::Instrument;

use dns_wire::serialise;
use dns_wire::types::Message;

use crate::metrics::{
    PROBE_OUTCOME_MISMATCHED, PROBE_OUTCOME_NO_REPLY, PROBE_OUTCOME_OK, UPSTREAM_PROBES_TOTAL,
};
use crate::net::{read_tcp_bytes, send_tcp_bytes};

/// How long a single upstream probe may spend on each of its UDP and
/// TCP exchanges.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// An upstream (foreign) nameserver which unanswered questions are
/// delegated to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Upstream {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Serialise the request once and probe every upstream in parallel.
///
/// Each upstream contributes at most one delegate response to the
/// returned channel, in whatever order the upstreams answer.  The
/// channel closes once every probe has finished, so a consumer
/// draining it always terminates.
pub fn spawn_delegation(
    request: &Message,
    upstreams: &[Upstream],
) -> Result<mpsc::Receiver<Message>, serialise::Error> {
    let octets: Bytes = request.to_octets()?.freeze();
    let id = request.header.id;

    let (tx, rx) = mpsc::channel(upstreams.len().max(1));
    for upstream in upstreams {
        let upstream = *upstream;
        let octets = octets.clone();
        let tx = tx.clone();
        tokio::spawn(
            async move {
                if let Some(response) = probe_upstream(id, upstream, &octets).await {
                    // the consumer may have gone away already
                    let _ = tx.send(response).await;
                }
            }
            .instrument(tracing::error_span!("probe_upstream", %upstream)),
        );
    }

    Ok(rx)
}

/// Probe one upstream: ask over UDP, and if the reply is truncated
/// ask again over TCP, resending the bytes already serialised.
async fn probe_upstream(id: u16, upstream: Upstream, octets: &[u8]) -> Option<Message> {
    let Some(reply) = query_upstream_udp(upstream, octets).await else {
        UPSTREAM_PROBES_TOTAL
            .with_label_values(&[PROBE_OUTCOME_NO_REPLY])
            .inc();
        return None;
    };
    if !reply_matches_request(id, &reply) {
        tracing::debug!("dropping mismatched UDP reply");
        UPSTREAM_PROBES_TOTAL
            .with_label_values(&[PROBE_OUTCOME_MISMATCHED])
            .inc();
        return None;
    }

    if reply.header.is_truncated {
        tracing::debug!("truncated UDP reply, retrying over TCP");
        let Some(reply) = query_upstream_tcp(upstream, octets).await else {
            UPSTREAM_PROBES_TOTAL
                .with_label_values(&[PROBE_OUTCOME_NO_REPLY])
                .inc();
            return None;
        };
        if !reply_matches_request(id, &reply) {
            tracing::debug!("dropping mismatched TCP reply");
            UPSTREAM_PROBES_TOTAL
                .with_label_values(&[PROBE_OUTCOME_MISMATCHED])
                .inc();
            return None;
        }
        UPSTREAM_PROBES_TOTAL
            .with_label_values(&[PROBE_OUTCOME_OK])
            .inc();
        return Some(reply);
    }

    UPSTREAM_PROBES_TOTAL
        .with_label_values(&[PROBE_OUTCOME_OK])
        .inc();
    Some(reply)
}

/// Send the serialised request to an upstream over UDP, returning the
/// parsed response.  `None` on timeout, I/O error, or an undecodable
/// reply.
async fn query_upstream_udp(upstream: Upstream, octets: &[u8]) -> Option<Message> {
    match timeout(PROBE_TIMEOUT, query_upstream_udp_notimeout(upstream, octets)).await {
        Ok(res) => res,
        Err(_) => {
            tracing::debug!("upstream UDP timeout");
            None
        }
    }
}

/// Timeout-less version of `query_upstream_udp`.
async fn query_upstream_udp_notimeout(upstream: Upstream, octets: &[u8]) -> Option<Message> {
    // an ephemeral socket per probe, connected so the kernel discards
    // datagrams from any source other than this upstream
    let mut buf = vec![0u8; 512];
    match UdpSocket::bind("0.0.0.0:0").await {
        Ok(sock) => match sock.connect((upstream.address, upstream.port)).await {
            Ok(()) => match sock.send(octets).await {
                Ok(_) => match sock.recv(&mut buf).await {
                    Ok(size) => match Message::from_octets(&buf[..size]) {
                        Ok(reply) => Some(reply),
                        Err(error) => {
                            tracing::debug!(?error, "dropping undecodable UDP reply");
                            None
                        }
                    },
                    Err(_) => None,
                },
                Err(_) => None,
            },
            Err(_) => None,
        },
        Err(_) => None,
    }
}

/// Send the serialised request to an upstream over TCP, returning the
/// parsed response.  `None` on timeout, I/O error, or an undecodable
/// reply.
async fn query_upstream_tcp(upstream: Upstream, octets: &[u8]) -> Option<Message> {
    match timeout(PROBE_TIMEOUT, query_upstream_tcp_notimeout(upstream, octets)).await {
        Ok(res) => res,
        Err(_) => {
            tracing::debug!("upstream TCP timeout");
            None
        }
    }
}

/// Timeout-less version of `query_upstream_tcp`.
async fn query_upstream_tcp_notimeout(upstream: Upstream, octets: &[u8]) -> Option<Message> {
    match TcpStream::connect((upstream.address, upstream.port)).await {
        Ok(mut stream) => match send_tcp_bytes(&mut stream, octets).await {
            Ok(()) => match read_tcp_bytes(&mut stream).await {
                Ok(bytes) => match Message::from_octets(bytes.as_ref()) {
                    Ok(reply) => Some(reply),
                    Err(error) => {
                        tracing::debug!(?error, "dropping undecodable TCP reply");
                        None
                    }
                },
                Err(_) => None,
            },
            Err(_) => None,
        },
        Err(_) => None,
    }
}

/// Very basic validation that an upstream reply corresponds to the
/// request: the id must match and it must actually be a response.
/// Whether the rcode is worth adopting is the processor's decision,
/// not ours.
fn reply_matches_request(id: u16, reply: &Message) -> bool {
    reply.header.id == id && reply.header.is_response
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_wire::types::test_util::*;
    use dns_wire::types::*;

    fn request() -> Message {
        Message::from_question(
            1234,
            Question {
                name: domain("www.example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        )
    }

    #[test]
    fn reply_matches_request_accepts_response_with_same_id() {
        let reply = request().make_response();

        assert!(reply_matches_request(1234, &reply));
    }

    #[test]
    fn reply_matches_request_checks_id() {
        let reply = request().make_response();

        assert!(!reply_matches_request(1235, &reply));
    }

    #[test]
    fn reply_matches_request_checks_qr() {
        // a query bounced straight back is not a response
        assert!(!reply_matches_request(1234, &request()));
    }

    #[tokio::test]
    async fn spawn_delegation_with_no_upstreams_closes_channel() {
        let mut rx = spawn_delegation(&request(), &[]).unwrap();

        assert_eq!(None, rx.recv().await);
    }
}
