//! Performance benchmarks for tollgate-core.
//!
//! Run with: cargo bench -p tollgate-core

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tollgate_core::SigningSecret;
use tollgate_core::auth::{
    AccessPolicy, MemoryUserStore, PasswordHasher, RequestAuthenticator, SecurityContext,
    SecurityPipeline, TokenCodec, TokenKind, UserRecord,
};

const ISSUER: &str = "http://localhost:8080";

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn codec() -> TokenCodec {
    TokenCodec::new(
        &SigningSecret::new("bench-secret").derive_key(),
        Duration::from_secs(3_600),
        &[],
    )
    .unwrap()
}

/// Benchmark token issuing.
fn bench_issue(c: &mut Criterion) {
    let codec = codec();

    c.bench_function("token_issue_pair", |b| {
        b.iter(|| {
            codec
                .issue_pair(black_box("victor"), ["USER", "ADMIN"], now(), ISSUER)
                .unwrap()
        });
    });
}

/// Benchmark token verification.
fn bench_verify(c: &mut Criterion) {
    let codec = codec();
    let token = codec
        .issue_access_token("victor", ["USER"], now(), ISSUER)
        .unwrap();

    c.bench_function("token_verify", |b| {
        b.iter(|| {
            codec
                .verify(black_box(&token), TokenKind::Access, now())
                .unwrap()
        });
    });

    c.bench_function("token_verify_tampered", |b| {
        let tampered = format!("{token}x");
        b.iter(|| codec.decode(black_box(&tampered)).is_err());
    });
}

/// Benchmark policy evaluation across path depths.
fn bench_policy(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_evaluate");
    let policy = AccessPolicy::default();
    let ctx = SecurityContext::empty();

    for path in ["/auth/signin", "/api/person/v1", "/users/1/roles/2", "/unknown/a/b/c/d"] {
        group.bench_with_input(BenchmarkId::new("path", path), path, |b, path| {
            b.iter(|| policy.evaluate(black_box(path), &ctx));
        });
    }

    group.finish();
}

/// Benchmark the full per-request pipeline.
fn bench_pipeline(c: &mut Criterion) {
    let codec = Arc::new(codec());
    let store = Arc::new(MemoryUserStore::with_users([UserRecord::new(
        "victor",
        "unused",
        ["USER"],
    )]));
    let pipeline = SecurityPipeline::new(
        RequestAuthenticator::new(Arc::clone(&codec), store),
        AccessPolicy::default(),
    );
    let header = format!(
        "Bearer {}",
        codec
            .issue_access_token("victor", ["USER"], now(), ISSUER)
            .unwrap()
    );

    c.bench_function("pipeline_process", |b| {
        b.iter(|| pipeline.process(black_box("/api/person/v1"), Some(&header), now()));
    });
}

/// Benchmark password hashing at a reduced cost.
fn bench_password(c: &mut Criterion) {
    let hasher = PasswordHasher::with_iterations(10_000);
    let encoded = hasher.hash("12345678").unwrap();

    c.bench_function("password_verify_10k", |b| {
        b.iter(|| hasher.verify(black_box("12345678"), &encoded));
    });
}

criterion_group!(
    benches,
    bench_issue,
    bench_verify,
    bench_policy,
    bench_pipeline,
    bench_password,
);
criterion_main!(benches);
