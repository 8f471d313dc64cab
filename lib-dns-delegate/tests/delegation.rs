//! End-to-end tests of the delegation pipeline against in-process
//! mock upstream nameservers bound to localhost.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, UdpSocket};

use dns_delegate::cache::SharedCache;
use dns_delegate::delegate::Upstream;
use dns_delegate::net::{read_tcp_bytes, send_tcp_bytes};
use dns_delegate::process::process_query;
use dns_wire::types::test_util::*;
use dns_wire::types::*;

const WAIT: Duration = Duration::from_secs(5);

fn a_question(name: &str) -> Question {
    Question {
        name: domain(name),
        qtype: QueryType::Record(RecordType::A),
        qclass: QueryClass::Record(RecordClass::IN),
    }
}

/// Bind a UDP socket on localhost and serve exactly one exchange,
/// deriving the reply from the received query.
async fn mock_udp_upstream<F>(make_reply: F) -> Upstream
where
    F: FnOnce(Message) -> Message + Send + 'static,
{
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        let (size, peer) = sock.recv_from(&mut buf).await.unwrap();
        let query = Message::from_octets(&buf[..size]).unwrap();
        let reply = make_reply(query);
        let octets = reply.to_octets().unwrap();
        sock.send_to(&octets, peer).await.unwrap();
    });

    Upstream {
        address: Ipv4Addr::LOCALHOST,
        port,
    }
}

#[tokio::test]
async fn delegation_resolves_via_upstream_and_caches() {
    let upstream = mock_udp_upstream(|query| {
        let mut reply = query.make_response();
        reply
            .answers
            .push(a_record("www.example.com.", Ipv4Addr::new(1, 1, 1, 1)));
        reply
    })
    .await;

    let cache = SharedCache::new();
    let started_at = Instant::now();
    let request = Message::from_question(300, a_question("www.example.com."));

    let response = process_query(&request, &cache, &[upstream], WAIT, started_at).await;

    assert_eq!(Rcode::NoError, response.header.rcode);
    assert!(response.header.is_response);
    assert_eq!(request.questions, response.questions);
    assert_eq!(1, response.answers.len());
    assert_eq!(
        RecordTypeWithData::A {
            address: Ipv4Addr::new(1, 1, 1, 1)
        },
        response.answers[0].rtype_with_data
    );

    // a second identical query must now be a cache hit: no upstream
    // is listening any more
    let again = process_query(&request, &cache, &[], WAIT, started_at).await;
    assert_eq!(Rcode::NoError, again.header.rcode);
    assert_eq!(1, again.answers.len());
}

#[tokio::test]
async fn delegation_retries_over_tcp_on_truncation() {
    // UDP and TCP listeners on the same localhost port; the UDP side
    // answers with the truncation flag, the TCP side with the records
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let sock = UdpSocket::bind(("127.0.0.1", port)).await.unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        let (size, peer) = sock.recv_from(&mut buf).await.unwrap();
        let query = Message::from_octets(&buf[..size]).unwrap();
        let reply = query.make_response().make_truncated();
        let octets = reply.to_octets().unwrap();
        sock.send_to(&octets, peer).await.unwrap();
    });

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let bytes = read_tcp_bytes(&mut stream).await.unwrap();
        let query = Message::from_octets(bytes.as_ref()).unwrap();
        let mut reply = query.make_response();
        reply
            .answers
            .push(a_record("big.example.com.", Ipv4Addr::new(2, 2, 2, 2)));
        let octets = reply.to_octets().unwrap();
        send_tcp_bytes(&mut stream, &octets).await.unwrap();
    });

    let upstream = Upstream {
        address: Ipv4Addr::LOCALHOST,
        port,
    };
    let cache = SharedCache::new();
    let request = Message::from_question(301, a_question("big.example.com."));

    let response = process_query(&request, &cache, &[upstream], WAIT, Instant::now()).await;

    assert_eq!(Rcode::NoError, response.header.rcode);
    assert!(!response.header.is_truncated);
    assert_eq!(1, response.answers.len());
    assert_eq!(
        RecordTypeWithData::A {
            address: Ipv4Addr::new(2, 2, 2, 2)
        },
        response.answers[0].rtype_with_data
    );
}

#[tokio::test]
async fn delegation_drops_undecodable_replies() {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        let (_, peer) = sock.recv_from(&mut buf).await.unwrap();
        sock.send_to(&[0xff, 0xff, 0xff], peer).await.unwrap();
    });

    let upstream = Upstream {
        address: Ipv4Addr::LOCALHOST,
        port,
    };
    let cache = SharedCache::new();
    let request = Message::from_question(302, a_question("www.example.com."));

    let response = process_query(&request, &cache, &[upstream], WAIT, Instant::now()).await;

    // the garbage reply is dropped, no other upstream exists, so the
    // query fails rather than hanging
    assert_eq!(Rcode::ServerFailure, response.header.rcode);
    assert_eq!(Vec::<ResourceRecord>::new(), response.answers);
}

#[tokio::test]
async fn delegation_ignores_error_rcodes() {
    let upstream = mock_udp_upstream(|query| {
        let mut reply = query.make_response();
        reply.header.rcode = Rcode::NameError;
        reply
            .answers
            .push(a_record("www.example.com.", Ipv4Addr::new(9, 9, 9, 9)));
        reply
    })
    .await;

    let cache = SharedCache::new();
    let request = Message::from_question(303, a_question("www.example.com."));

    let response = process_query(&request, &cache, &[upstream], WAIT, Instant::now()).await;

    assert_eq!(Rcode::ServerFailure, response.header.rcode);
    assert_eq!(Vec::<ResourceRecord>::new(), response.answers);
}

#[tokio::test]
async fn delegation_merges_answers_across_upstreams() {
    // two upstreams answer the same question with overlapping record
    // sets; the response must contain each distinct record once
    let slow = mock_udp_upstream(|query| {
        let mut reply = query.make_response();
        reply
            .answers
            .push(a_record("www.example.com.", Ipv4Addr::new(1, 1, 1, 1)));
        reply
    })
    .await;
    let fast = mock_udp_upstream(|query| {
        let mut reply = query.make_response();
        reply
            .answers
            .push(a_record("www.example.com.", Ipv4Addr::new(1, 1, 1, 1)));
        reply
    })
    .await;

    let cache = SharedCache::new();
    let request = Message::from_question(304, a_question("www.example.com."));

    let response = process_query(&request, &cache, &[slow, fast], WAIT, Instant::now()).await;

    assert_eq!(Rcode::NoError, response.header.rcode);
    assert_eq!(1, response.answers.len());
}
