//! The per-query state machine: preprocess, consult the cache,
//! delegate to the upstreams, merge their responses, populate the
//! cache, reply.
//!
//! While a query is in flight the response's rcode is *undecided*,
//! modelled as an `Option<Rcode>`: the header is only stamped once a
//! decision is reached.  A processor always reaches one - the
//! delegation wait is bounded, and expiry (or running out of
//! upstreams) decides `ServerFailure`.

use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::time::timeout_at;

use dns_wire::types::*;

use crate::cache::SharedCache;
use crate::delegate::{spawn_delegation, Upstream};
use crate::metrics::{CACHE_HIT_TOTAL, CACHE_MISS_TOTAL};

/// Resolve one request message into the response to send back.
///
/// `started_at` is when the request arrived; cache TTL arithmetic is
/// relative to it.  `wait` bounds how long delegation may take before
/// the query is failed.
pub async fn process_query(
    request: &Message,
    cache: &SharedCache,
    upstreams: &[Upstream],
    wait: Duration,
    started_at: Instant,
) -> Message {
    let mut response = Message {
        header: Header {
            id: request.header.id,
            is_response: true,
            opcode: request.header.opcode,
            is_authoritative: false,
            is_truncated: false,
            recursion_desired: request.header.recursion_desired,
            recursion_available: true,
            // stamped with the decided rcode just before replying
            rcode: Rcode::NoError,
        },
        questions: Vec::new(),
        answers: Vec::new(),
        authority: Vec::new(),
        additional: Vec::new(),
    };

    let mut decided = preprocess(request);

    if decided.is_none() {
        let mut all_hit = true;
        for question in &request.questions {
            let rrs = cache.get(started_at, question);
            tracing::debug!(%question, hits = rrs.len(), "cache lookup");
            if rrs.is_empty() {
                CACHE_MISS_TOTAL.inc();
                all_hit = false;
            } else {
                CACHE_HIT_TOTAL.inc();
            }
            response.answers.extend(rrs);
        }
        if all_hit {
            response.questions = request.questions.clone();
            decided = Some(Rcode::NoError);
        }
    }

    if decided.is_none() {
        match spawn_delegation(request, upstreams) {
            Ok(mut rx) => {
                let deadline = tokio::time::Instant::now() + wait;
                while decided.is_none() {
                    match timeout_at(deadline, rx.recv()).await {
                        Ok(Some(delegate_response)) => {
                            decided = assemble(
                                &mut response,
                                &delegate_response,
                                request.questions.len(),
                            );
                        }
                        Ok(None) => {
                            tracing::debug!("every upstream probe has reported");
                            break;
                        }
                        Err(_) => {
                            tracing::debug!("delegation timed out");
                            break;
                        }
                    }
                }
            }
            Err(error) => {
                tracing::warn!(?error, "could not serialise request for delegation");
            }
        }
    }

    response.header.rcode = decided.unwrap_or(Rcode::ServerFailure);

    for rr in &response.answers {
        cache.insert(started_at, rr);
    }

    response
}

/// Check for anything this server does not implement: IQUERY and
/// STATUS opcodes, zone transfers, and any question or record
/// carrying an uninterpreted type or class.  Returns the rcode to
/// reply with immediately, if so.
fn preprocess(request: &Message) -> Option<Rcode> {
    if request.header.opcode != Opcode::Query {
        return Some(Rcode::NotImplemented);
    }

    for question in &request.questions {
        if question.is_unknown() || question.qtype == QueryType::AXFR {
            return Some(Rcode::NotImplemented);
        }
    }

    for rr in request
        .answers
        .iter()
        .chain(&request.authority)
        .chain(&request.additional)
    {
        if rr.is_unknown() {
            return Some(Rcode::NotImplemented);
        }
    }

    None
}

/// Merge one delegate response into the response being built.
/// Returns the decided rcode if this message decided it, otherwise
/// `None` (and a delegate response with an error rcode contributes
/// nothing at all).
fn assemble(
    response: &mut Message,
    delegate_response: &Message,
    request_question_count: usize,
) -> Option<Rcode> {
    if delegate_response.header.rcode != Rcode::NoError {
        tracing::debug!(
            rcode = %delegate_response.header.rcode,
            "discarding delegate response"
        );
        return None;
    }

    response
        .questions
        .extend(delegate_response.questions.iter().cloned());
    merge_records(&mut response.answers, &delegate_response.answers);
    merge_records(&mut response.authority, &delegate_response.authority);
    merge_records(&mut response.additional, &delegate_response.additional);

    if response.questions.len() >= request_question_count {
        Some(Rcode::NoError)
    } else {
        None
    }
}

/// Append records to a section, dropping those with a type or class
/// this server does not interpret, and those already present.  Two
/// records are duplicates if they agree on class, type, name, and
/// data; the TTL is not compared, the first seen wins.
fn merge_records(section: &mut Vec<ResourceRecord>, new: &[ResourceRecord]) {
    let mut seen: HashSet<(DomainName, RecordClass, RecordTypeWithData)> = section
        .iter()
        .map(|rr| (rr.name.clone(), rr.rclass, rr.rtype_with_data.clone()))
        .collect();

    for rr in new {
        if rr.is_unknown() {
            continue;
        }
        if seen.insert((rr.name.clone(), rr.rclass, rr.rtype_with_data.clone())) {
            section.push(rr.clone());
        }
    }
}
