use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mboxcontacts::config::Config;

fn config() -> Config {
    let mut config = Config::default();
    config.domains.internal = vec!["allfed.info".to_string()];
    config
}

fn bench_read_mbox(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("sent.mbox");

    c.bench_function("read_sent_mbox", |b| {
        b.iter(|| {
            mboxcontacts::parser::MboxReader::open(&fixture_path)
                .unwrap()
                .filter_map(Result::ok)
                .count()
        })
    });
}

fn bench_extract_contacts(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("sent.mbox");
    let config = config();

    c.bench_function("extract_sent_mbox", |b| {
        b.iter(|| mboxcontacts::extract_contacts(&fixture_path, &config, |_, _| {}).unwrap())
    });
}

fn bench_classify(c: &mut Criterion) {
    let classifier = mboxcontacts::classify::AddressClassifier::new(&config().domains);
    let addresses = [
        "Alice.Nguyen@Agriculture.gov.au",
        "<carol@resilience.edu.au>",
        "team@mail.allfed.info",
        "dan@harbour.com.au",
        "bob@",
    ];

    c.bench_function("classify_addresses", |b| {
        b.iter(|| {
            addresses
                .iter()
                .filter(|a| classifier.classify(a).is_ok())
                .count()
        })
    });
}

criterion_group!(benches, bench_read_mbox, bench_extract_contacts, bench_classify);
criterion_main!(benches);
