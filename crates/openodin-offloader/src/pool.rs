//! The worker pool: OS threads reached through a bounded channel, fed
//! round-robin chunks of each batch, with one reply future awaited by the
//! caller (§4.6, §9 "model worker tasks as OS threads... behind a bounded
//! channel; per-worker channels are hidden from callers").

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use openodin_core::{PublicKey, Signature};
use openodin_crypto::verify;

use crate::registry::KeyRegistry;

/// One item to sign: `index` lets the caller reassemble results after
/// round-robin fan-out scrambles order.
#[derive(Debug, Clone)]
pub struct ToBeSigned {
    pub index: usize,
    pub message: Vec<u8>,
    pub public_key: PublicKey,
}

#[derive(Debug, Clone)]
pub struct SignedResult {
    pub index: usize,
    pub signature: Signature,
}

/// A single signature to check within a collection.
#[derive(Debug, Clone)]
pub struct SignatureToVerify {
    pub public_key: PublicKey,
    pub message: Vec<u8>,
    pub signature: Signature,
}

/// A node's full signature set. `index` identifies the node within the
/// caller's batch; the collection is "verified" iff every inner signature
/// validates (§4.6 verify contract).
#[derive(Debug, Clone)]
pub struct SignaturesCollection {
    pub index: usize,
    pub signatures: Vec<SignatureToVerify>,
}

enum Job {
    Sign {
        items: Vec<ToBeSigned>,
        reply: oneshot::Sender<Option<Vec<SignedResult>>>,
    },
    Verify {
        collections: Vec<SignaturesCollection>,
        reply: oneshot::Sender<Vec<usize>>,
    },
}

struct WorkerHandle {
    sender: std_mpsc::Sender<Job>,
    thread: Option<std::thread::JoinHandle<()>>,
}

/// Pool of `N` worker threads, `N = cores` by default (§4.6).
pub struct SignatureOffloader {
    workers: Vec<WorkerHandle>,
    registry: KeyRegistry,
    next_worker: AtomicUsize,
    closed: std::sync::atomic::AtomicBool,
}

impl SignatureOffloader {
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let registry = KeyRegistry::new();
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let (sender, receiver) = std_mpsc::channel::<Job>();
            let worker_registry = registry.clone();
            let thread = std::thread::Builder::new()
                .name(format!("openodin-signer-{id}"))
                .spawn(move || worker_loop(id, receiver, worker_registry))
                .expect("failed to spawn signature worker thread");
            workers.push(WorkerHandle {
                sender,
                thread: Some(thread),
            });
        }
        Self {
            workers,
            registry,
            next_worker: AtomicUsize::new(0),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn add_key_pair(&self, secret_key: openodin_crypto::SecretKey) {
        self.registry.add_key_pair(secret_key);
    }

    fn chunk_boundaries(total: usize, worker_count: usize) -> Vec<(usize, usize)> {
        if total == 0 {
            return vec![(0, 0); worker_count];
        }
        let base = total / worker_count;
        let remainder = total % worker_count;
        let mut bounds = Vec::with_capacity(worker_count);
        let mut start = 0;
        for i in 0..worker_count {
            let size = base + usize::from(i < remainder);
            bounds.push((start, start + size));
            start += size;
        }
        bounds
    }

    /// Signs a batch. Returns an empty vector if any item fails (fail-fast
    /// whole-batch semantics, §4.6).
    pub async fn sign_batch(&self, items: Vec<ToBeSigned>) -> Vec<SignedResult> {
        if self.closed.load(Ordering::SeqCst) {
            warn!("sign_batch called on a closed offloader");
            return Vec::new();
        }
        let worker_count = self.workers.len();
        let bounds = Self::chunk_boundaries(items.len(), worker_count);
        let start = self.next_worker.fetch_add(1, Ordering::Relaxed) % worker_count;

        let mut receivers = Vec::with_capacity(worker_count);
        let mut owned_items: Vec<Option<ToBeSigned>> = items.into_iter().map(Some).collect();
        for offset in 0..worker_count {
            let worker_idx = (start + offset) % worker_count;
            let (lo, hi) = bounds[offset];
            let chunk: Vec<ToBeSigned> = owned_items[lo..hi]
                .iter_mut()
                .map(|slot| slot.take().expect("chunk bounds do not overlap"))
                .collect();
            let (reply_tx, reply_rx) = oneshot::channel();
            self.workers[worker_idx]
                .sender
                .send(Job::Sign {
                    items: chunk,
                    reply: reply_tx,
                })
                .expect("signature worker thread has died");
            receivers.push(reply_rx);
        }

        let mut all_results = Vec::new();
        for rx in receivers {
            match rx.await {
                Ok(Some(mut chunk_results)) => all_results.append(&mut chunk_results),
                Ok(None) => {
                    debug!("sign_batch: a worker reported a failed item, failing whole batch");
                    return Vec::new();
                }
                Err(_) => {
                    warn!("sign_batch: worker dropped reply channel");
                    return Vec::new();
                }
            }
        }
        all_results.sort_by_key(|r| r.index);
        all_results
    }

    /// Verifies a batch of signature collections. Returns the indexes of
    /// collections where every signature validated (§4.6 verify contract).
    pub async fn verify_batch(&self, collections: Vec<SignaturesCollection>) -> Vec<usize> {
        if self.closed.load(Ordering::SeqCst) {
            warn!("verify_batch called on a closed offloader");
            return Vec::new();
        }
        let worker_count = self.workers.len();
        let bounds = Self::chunk_boundaries(collections.len(), worker_count);
        let start = self.next_worker.fetch_add(1, Ordering::Relaxed) % worker_count;

        let mut receivers = Vec::with_capacity(worker_count);
        let mut owned: Vec<Option<SignaturesCollection>> =
            collections.into_iter().map(Some).collect();
        for offset in 0..worker_count {
            let worker_idx = (start + offset) % worker_count;
            let (lo, hi) = bounds[offset];
            let chunk: Vec<SignaturesCollection> = owned[lo..hi]
                .iter_mut()
                .map(|slot| slot.take().expect("chunk bounds do not overlap"))
                .collect();
            let (reply_tx, reply_rx) = oneshot::channel();
            self.workers[worker_idx]
                .sender
                .send(Job::Verify {
                    collections: chunk,
                    reply: reply_tx,
                })
                .expect("signature worker thread has died");
            receivers.push(reply_rx);
        }

        let mut verified = Vec::new();
        for rx in receivers {
            if let Ok(mut indexes) = rx.await {
                verified.append(&mut indexes);
            }
        }
        verified.sort_unstable();
        verified
    }

    /// Terminates all workers and rejects any batch submitted afterwards
    /// (§4.6 "Cancellation is coarse").
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        for worker in &mut self.workers {
            // Dropping the sender unblocks the worker's recv loop.
            let (dead_tx, _) = std_mpsc::channel();
            let _ = std::mem::replace(&mut worker.sender, dead_tx);
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for SignatureOffloader {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            self.close();
        }
    }
}

fn worker_loop(id: usize, receiver: std_mpsc::Receiver<Job>, registry: KeyRegistry) {
    while let Ok(job) = receiver.recv() {
        match job {
            Job::Sign { items, reply } => {
                let mut results = Vec::with_capacity(items.len());
                let mut failed = false;
                for item in items {
                    match registry.get(&item.public_key) {
                        Some(secret_key) => {
                            let signature = secret_key.sign(&item.message);
                            results.push(SignedResult {
                                index: item.index,
                                signature,
                            });
                        }
                        None => {
                            debug!(worker = id, "no secret key for public key, failing item");
                            failed = true;
                            break;
                        }
                    }
                }
                let _ = reply.send(if failed { None } else { Some(results) });
            }
            Job::Verify { collections, reply } => {
                let mut verified = Vec::new();
                for collection in collections {
                    let all_ok = collection.signatures.iter().all(|sig| {
                        verify(&sig.public_key, &sig.message, &sig.signature).is_ok()
                    });
                    if all_ok {
                        verified.push(collection.index);
                    }
                }
                let _ = reply.send(verified);
            }
        }
    }
}
