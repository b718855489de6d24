use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dynamodb_testkit::item;
use dynamodb_testkit::schema::{KeyAttribute, TableSchema};
use dynamodb_testkit::{
    session, Condition, DynamoView, ItemType, LifecycleConfig, ReadConsistency, SessionIdentity,
    View,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize, Deserialize)]
struct Document {
    id: String,
    version: i64,
    lines: Vec<String>,
}

#[derive(Serialize)]
struct DocumentKey {
    id: String,
}

impl ItemType for Document {
    type Key = DocumentKey;
    const TABLE_NAME: &'static str = "Documents";
    const VERSION_ATTRIBUTE: Option<&'static str> = Some("version");

    fn key(&self) -> DocumentKey {
        DocumentKey {
            id: self.id.clone(),
        }
    }
}

async fn save_and_load(
    view: &DynamoView<Document>,
    id: usize,
    lines: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let document = Document {
        id: format!("doc-{}", id),
        version: 1,
        lines: vec!["lorem ipsum".to_string(); lines],
    };
    view.save(&document, None, true).await?;

    let key = DocumentKey {
        id: document.id.clone(),
    };
    let loaded = view.load(&key, ReadConsistency::Strong).await?;
    assert!(loaded.is_some());
    Ok(())
}

fn view_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut session = session::in_memory()
        .with_identity(SessionIdentity::new("bench", 58998))
        .with_lifecycle_config(LifecycleConfig::default().with_probe_interval(Duration::from_millis(1)))
        .with_table(TableSchema::new("Documents", KeyAttribute::string("id")))
        .build();
    rt.block_on(session.start()).unwrap();
    let view = session.view::<Document>().unwrap();

    let mut group = c.benchmark_group("save_load");

    // Benchmark different document sizes
    for lines in [1, 10, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, &lines| {
            b.to_async(&rt).iter(|| save_and_load(&view, 1, lines));
        });
    }

    group.finish();
    session.stop();
}

fn condition_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition");

    let condition = Condition::not_exists("version")
        .or(Condition::equals("version", item::number(41)))
        .and(Condition::greater_than("total", item::number(100)))
        .and(Condition::exists("owner"));
    let stored = item::to_item(&serde_json::json!({
        "version": 41,
        "total": 250,
        "owner": "someone",
    }))
    .unwrap();

    group.bench_function("render", |b| b.iter(|| condition.render()));
    group.bench_function("evaluate", |b| b.iter(|| condition.evaluate(Some(&stored))));

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));
    targets = view_benchmark, condition_benchmark
}

criterion_main!(benches);
