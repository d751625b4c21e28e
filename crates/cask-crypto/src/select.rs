use std::time::Instant;

use crate::aes_gcm::Aes256GcmEngine;
use crate::chacha20_poly1305::ChaCha20Poly1305Engine;
use crate::{CryptoEngine, EncryptionMode};

const SMALL_SIZE: usize = 4 * 1024;
const LARGE_SIZE: usize = 1024 * 1024;
const SMALL_TOTAL_BYTES: usize = 4 * 1024 * 1024;
const LARGE_TOTAL_BYTES: usize = 32 * 1024 * 1024;
const SMALL_WEIGHT: f64 = 0.7;
const LARGE_WEIGHT: f64 = 0.3;
const TIE_BIAS_THRESHOLD: f64 = 0.05;

/// Benchmark both AEADs on this host and pick the faster one.
///
/// AES-GCM wins on machines with AES-NI; ChaCha20-Poly1305 wins on those
/// without. Small blobs dominate real pack workloads, hence the weighting.
pub fn select_best_aead() -> EncryptionMode {
    let gcm = benchmark_candidate(EncryptionMode::Aes256Gcm);
    let chacha = benchmark_candidate(EncryptionMode::ChaCha20Poly1305);
    choose_from_scores(gcm, chacha)
}

fn benchmark_candidate(candidate: EncryptionMode) -> f64 {
    let encryption_key = [0x3Au8; 32];

    let engine: Box<dyn CryptoEngine> = match candidate {
        EncryptionMode::Aes256Gcm => Box::new(Aes256GcmEngine::new(&encryption_key)),
        EncryptionMode::ChaCha20Poly1305 => {
            Box::new(ChaCha20Poly1305Engine::new(&encryption_key))
        }
    };

    let small = benchmark_input(SMALL_SIZE);
    let large = benchmark_input(LARGE_SIZE);

    // Warm up both message sizes before timing.
    let _ = run_once(engine.as_ref(), &small);
    let _ = run_once(engine.as_ref(), &large);

    let small_iterations = SMALL_TOTAL_BYTES / SMALL_SIZE;
    let large_iterations = LARGE_TOTAL_BYTES / LARGE_SIZE;

    let small_mibps = measure_mib_per_sec(engine.as_ref(), &small, small_iterations);
    let large_mibps = measure_mib_per_sec(engine.as_ref(), &large, large_iterations);
    weighted_score(small_mibps, large_mibps)
}

fn measure_mib_per_sec(engine: &dyn CryptoEngine, payload: &[u8], iterations: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iterations {
        let Ok(ciphertext) = engine.encrypt(payload) else {
            return 0.0;
        };
        let Ok(plaintext) = engine.decrypt(&ciphertext) else {
            return 0.0;
        };
        if plaintext != payload {
            return 0.0;
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    if elapsed <= 0.0 {
        return 0.0;
    }

    let total_mib = (payload.len() * iterations) as f64 / (1024.0 * 1024.0);
    total_mib / elapsed
}

fn run_once(engine: &dyn CryptoEngine, payload: &[u8]) -> bool {
    let Ok(ciphertext) = engine.encrypt(payload) else {
        return false;
    };
    let Ok(plaintext) = engine.decrypt(&ciphertext) else {
        return false;
    };
    plaintext == payload
}

fn benchmark_input(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn weighted_score(small_mibps: f64, large_mibps: f64) -> f64 {
    (small_mibps * SMALL_WEIGHT) + (large_mibps * LARGE_WEIGHT)
}

fn choose_from_scores(gcm: f64, chacha: f64) -> EncryptionMode {
    if chacha > gcm * (1.0 + TIE_BIAS_THRESHOLD) {
        EncryptionMode::ChaCha20Poly1305
    } else {
        EncryptionMode::Aes256Gcm
    }
}
