//! Caching of resource records, keyed by class, type, owner name, and
//! record data.  Owner names are normalised to lowercase on the way
//! in, so lookups are case-insensitive.  TTLs are rewritten at lookup
//! time relative to the caller's clock.

use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dns_wire::types::*;

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

/// A convenience wrapper around a `Cache` which lets it be shared
/// between tasks.
///
/// Invoking `clone` on a `SharedCache` gives a new instance which
/// refers to the same underlying `Cache` object.  The mutex is only
/// held for the duration of a single operation, never across an await
/// point.
#[derive(Debug, Clone)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

impl SharedCache {
    /// Make a new, empty, shared cache.
    pub fn new() -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::new())),
        }
    }

    /// Create a new cache with the given desired size.
    pub fn with_desired_size(desired_size: usize) -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::with_desired_size(desired_size))),
        }
    }

    /// Get all records matching the question's class, type, and name
    /// exactly.  Name matching is case-insensitive; the TTLs in the
    /// returned records are rewritten to the remaining lifetime as
    /// seen from `now`.
    ///
    /// Wildcard (and other non-record) qtypes and qclasses always
    /// miss: those questions are for the upstream nameservers, not
    /// the cache.
    pub fn get(&self, now: Instant, question: &Question) -> Vec<ResourceRecord> {
        let QueryType::Record(rtype) = question.qtype else {
            return Vec::new();
        };
        let QueryClass::Record(rclass) = question.qclass else {
            return Vec::new();
        };

        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .get(now, &question.name, rclass, rtype)
    }

    /// Insert an entry into the cache, replacing any entry with the
    /// same class, type, name, and record data.
    ///
    /// It is not inserted if its TTL is zero.
    ///
    /// This may make the cache grow beyond the desired size.
    pub fn insert(&self, now: Instant, record: &ResourceRecord) {
        if record.ttl > 0 {
            let mut cache = self.cache.lock().expect(MUTEX_POISON_MESSAGE);
            cache.insert(now, record);
        }
    }

    /// Atomically clears expired entries and, if the cache has grown
    /// beyond its desired size, prunes entries to get down to size.
    ///
    /// Returns `(has overflowed?, current size, num expired, num pruned)`.
    pub fn prune(&self) -> (bool, usize, usize, usize) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).prune()
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Caching for `ResourceRecord`s.
///
/// You probably want to use `SharedCache` instead.
#[derive(Debug, Clone)]
pub struct Cache {
    /// Cached records, indexed by lowercased domain name.
    entries: HashMap<DomainName, CachedDomainRecords>,

    /// Priority queue of domain names ordered by access times.
    ///
    /// When the cache is full and there are no expired records to
    /// prune, domains will instead be pruned in LRU order.
    ///
    /// INVARIANT: the domains in here are exactly the domains in
    /// `entries`.
    access_priority: PriorityQueue<DomainName, Reverse<Instant>>,

    /// Priority queue of domain names ordered by expiry time.
    ///
    /// When the cache is pruned, expired records are removed first.
    ///
    /// INVARIANT: the domains in here are exactly the domains in
    /// `entries`.
    expiry_priority: PriorityQueue<DomainName, Reverse<Instant>>,

    /// The number of records in the cache.
    ///
    /// INVARIANT: this is the sum of the `size` fields of the
    /// entries.
    current_size: usize,

    /// The desired maximum number of records in the cache.
    desired_size: usize,
}

/// The cached records for a domain.
#[derive(Debug, Clone, Eq, PartialEq)]
struct CachedDomainRecords {
    /// The time this entry was last read at.
    last_read: Instant,

    /// When the next record expires.
    ///
    /// INVARIANT: this is the minimum of the end-of-life instants of
    /// the records.
    next_expiry: Instant,

    /// How many records there are.
    ///
    /// INVARIANT: this is the sum of the vector lengths in `records`.
    size: usize,

    /// The records, further divided by class and record type.
    ///
    /// INVARIANT: the key and the `RecordTypeWithData` match.
    records: HashMap<(RecordClass, RecordType), Vec<(RecordTypeWithData, Instant)>>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Create a new cache with a default desired size.
    pub fn new() -> Self {
        Self::with_desired_size(512)
    }

    /// Create a new cache with the given desired size.
    ///
    /// If the number of entries exceeds this, expired and
    /// least-recently-used items will be pruned.
    ///
    /// # Panics
    ///
    /// If called with a `desired_size` of 0.
    pub fn with_desired_size(desired_size: usize) -> Self {
        assert!(desired_size > 0, "cannot create a zero-size cache");

        Self {
            // most domains will have more than one record, so
            // `desired_size` would be too big for the `entries`.
            entries: HashMap::with_capacity(desired_size / 2),
            access_priority: PriorityQueue::with_capacity(desired_size),
            expiry_priority: PriorityQueue::with_capacity(desired_size),
            current_size: 0,
            desired_size,
        }
    }

    /// Get records for a `(class, type, name)` key.  The TTL of each
    /// returned record is its remaining lifetime as seen from `now`;
    /// records past their end of life are not returned.
    pub fn get(
        &mut self,
        now: Instant,
        name: &DomainName,
        rclass: RecordClass,
        rtype: RecordType,
    ) -> Vec<ResourceRecord> {
        let key = name.to_lowercase();
        if let Some(entry) = self.entries.get_mut(&key) {
            let mut rrs = Vec::new();
            if let Some(tuples) = entry.records.get(&(rclass, rtype)) {
                for (rdata, eol) in tuples {
                    if *eol < now {
                        continue;
                    }
                    let ttl = u32::try_from(eol.saturating_duration_since(now).as_secs())
                        .unwrap_or(u32::MAX);
                    rrs.push(ResourceRecord {
                        name: name.clone(),
                        rtype_with_data: rdata.clone(),
                        rclass,
                        ttl,
                    });
                }
            }
            if !rrs.is_empty() {
                entry.last_read = now;
                self.access_priority
                    .change_priority(&key, Reverse(entry.last_read));
            }
            rrs
        } else {
            Vec::new()
        }
    }

    /// Insert an entry into the cache.  A prior entry with the same
    /// class, type, name, and record data is replaced, taking the new
    /// end of life.
    pub fn insert(&mut self, now: Instant, record: &ResourceRecord) {
        let key = record.name.to_lowercase();
        let rtype = record.rtype_with_data.rtype();
        let eol = now + Duration::from_secs(record.ttl.into());
        let tuple = (record.rtype_with_data.clone(), eol);

        if let Some(entry) = self.entries.get_mut(&key) {
            if let Some(tuples) = entry.records.get_mut(&(record.rclass, rtype)) {
                let mut duplicate_eol = None;
                for i in 0..tuples.len() {
                    let t = &tuples[i];
                    if t.0 == tuple.0 {
                        duplicate_eol = Some(t.1);
                        tuples.swap_remove(i);
                        break;
                    }
                }

                tuples.push(tuple);

                if let Some(dup_eol) = duplicate_eol {
                    entry.size -= 1;
                    self.current_size -= 1;

                    if dup_eol == entry.next_expiry {
                        let mut new_next_expiry = eol;
                        for (_, e) in tuples {
                            if *e < new_next_expiry {
                                new_next_expiry = *e;
                            }
                        }
                        entry.next_expiry = new_next_expiry;
                        self.expiry_priority
                            .change_priority(&key, Reverse(entry.next_expiry));
                    }
                }
            } else {
                entry.records.insert((record.rclass, rtype), vec![tuple]);
            }
            entry.last_read = now;
            entry.size += 1;
            self.access_priority
                .change_priority(&key, Reverse(entry.last_read));
            if eol < entry.next_expiry {
                entry.next_expiry = eol;
                self.expiry_priority
                    .change_priority(&key, Reverse(entry.next_expiry));
            }
        } else {
            let mut records = HashMap::new();
            records.insert((record.rclass, rtype), vec![tuple]);
            let entry = CachedDomainRecords {
                last_read: now,
                next_expiry: eol,
                size: 1,
                records,
            };
            self.access_priority
                .push(key.clone(), Reverse(entry.last_read));
            self.expiry_priority
                .push(key.clone(), Reverse(entry.next_expiry));
            self.entries.insert(key, entry);
        }

        self.current_size += 1;
    }

    /// Delete all expired records.
    ///
    /// Returns the number of records deleted.
    pub fn remove_expired(&mut self) -> usize {
        let mut pruned = 0;

        loop {
            let before = pruned;
            pruned += self.remove_expired_step();
            if before == pruned {
                break;
            }
        }

        pruned
    }

    /// Delete all expired records, and then enough
    /// least-recently-used records to reduce the cache to the desired
    /// size.
    ///
    /// Returns `(has overflowed?, current size, num expired, num pruned)`.
    pub fn prune(&mut self) -> (bool, usize, usize, usize) {
        let has_overflowed = self.current_size > self.desired_size;
        let num_expired = self.remove_expired();
        let mut num_pruned = 0;

        while self.current_size > self.desired_size {
            num_pruned += self.remove_least_recently_used();
        }

        (has_overflowed, self.current_size, num_expired, num_pruned)
    }

    /// Helper for `remove_expired`: looks at the next-to-expire
    /// domain and cleans up expired records from it.  This may delete
    /// more than one record, and may even delete the whole domain.
    ///
    /// Returns the number of records removed.
    fn remove_expired_step(&mut self) -> usize {
        if let Some((name, Reverse(expiry))) = self.expiry_priority.pop() {
            let now = Instant::now();

            if expiry > now {
                self.expiry_priority.push(name, Reverse(expiry));
                return 0;
            }

            if let Some(entry) = self.entries.get_mut(&name) {
                let mut pruned = 0;

                let keys = entry
                    .records
                    .keys()
                    .copied()
                    .collect::<Vec<(RecordClass, RecordType)>>();
                let mut next_expiry = None;
                for key in keys {
                    if let Some(tuples) = entry.records.get_mut(&key) {
                        let len = tuples.len();
                        tuples.retain(|(_, eol)| eol > &now);
                        pruned += len - tuples.len();
                        for (_, eol) in tuples {
                            match next_expiry {
                                None => next_expiry = Some(*eol),
                                Some(t) if *eol < t => next_expiry = Some(*eol),
                                _ => (),
                            }
                        }
                    }
                }

                entry.size -= pruned;

                if let Some(ne) = next_expiry {
                    entry.next_expiry = ne;
                    self.expiry_priority.push(name, Reverse(ne));
                } else {
                    self.entries.remove(&name);
                    self.access_priority.remove(&name);
                }

                self.current_size -= pruned;
                pruned
            } else {
                self.access_priority.remove(&name);
                0
            }
        } else {
            0
        }
    }

    /// Helper for `prune`: deletes all records associated with the
    /// least recently used domain.
    ///
    /// Returns the number of records removed.
    fn remove_least_recently_used(&mut self) -> usize {
        if let Some((name, _)) = self.access_priority.pop() {
            self.expiry_priority.remove(&name);

            if let Some(entry) = self.entries.remove(&name) {
                let pruned = entry.size;
                self.current_size -= pruned;
                pruned
            } else {
                0
            }
        } else {
            0
        }
    }
}
