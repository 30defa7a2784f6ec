use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use tokengate_auth::testing::{EnvelopeSealer, issuer_key};
use tokengate_auth::{AllowList, EnvelopeDecryptor, OaepDigest, PayloadGrammar, parse};

/// Full CPU-bound part of token validation: decrypt, parse, authorize.
fn bench_decrypt_parse_authorize(c: &mut Criterion) {
    let key = issuer_key();
    let allow_list = AllowList::new((0..32).map(|i| format!("service-{i}"))).unwrap();

    let mut group = c.benchmark_group("token_cpu_path");
    for digest in [OaepDigest::Sha1, OaepDigest::Sha256] {
        let decryptor = EnvelopeDecryptor::new(key.clone(), digest);
        let envelope = EnvelopeSealer::new(&key, digest).seal("service-31_1700000000");

        group.bench_with_input(
            BenchmarkId::new("decrypt_parse_authorize", format!("{digest:?}")),
            &envelope,
            |b, envelope| {
                b.iter(|| {
                    let plaintext = decryptor.decrypt(black_box(envelope)).unwrap();
                    let parsed = parse(&plaintext, PayloadGrammar::Token).unwrap();
                    black_box(allow_list.authorize(parsed.body))
                })
            },
        );
    }
    group.finish();
}

/// Rejections must stay cheap: malformed input never reaches the private key.
fn bench_rejections(c: &mut Criterion) {
    let decryptor = EnvelopeDecryptor::new(issuer_key(), OaepDigest::Sha1);
    let not_base64 = "!".repeat(2000);
    let oversized = "A".repeat(2000);

    let mut group = c.benchmark_group("envelope_rejections");
    group.bench_function("not_base64", |b| {
        b.iter(|| decryptor.decrypt(black_box(&not_base64)).unwrap_err())
    });
    group.bench_function("oversized", |b| {
        b.iter(|| decryptor.decrypt(black_box(&oversized)).unwrap_err())
    });
    group.finish();
}

criterion_group!(benches, bench_decrypt_parse_authorize, bench_rejections);
criterion_main!(benches);
