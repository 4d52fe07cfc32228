mod support;

use common::config::components::inputs::TagMatch;
use common::types::Backend;
use staging::branch::{rewriter_for, EmulatedBranchRewriter, InputRewriter, NativeBranchRewriter};
use staging::source::{FileInput, TableInput, TableOptions, TableSearchInput, Tag};
use staging::state::{Marker, SourceKey, StateSnapshot};
use staging::StagingError;
use support::*;

fn orders() -> TableInput {
    TableInput::new(table_id("out.c-main.orders"))
}

fn emulated(storage: &std::sync::Arc<FakeStorage>) -> EmulatedBranchRewriter {
    EmulatedBranchRewriter::new(dev_context(false), storage.clone())
}

fn native(storage: &std::sync::Arc<FakeStorage>) -> NativeBranchRewriter {
    NativeBranchRewriter::new(dev_context(true), storage.clone())
}

#[tokio::test]
async fn emulated_keeps_input_when_branch_table_is_missing() {
    let storage = FakeStorage::new();
    storage.add_table(&default_branch(), "out.c-main.orders", Backend::Snowflake);

    let resolved = emulated(&storage).rewrite_table(&orders()).await.unwrap();

    assert_eq!(resolved.physical, orders().source);
    assert_eq!(resolved.unresolved(), orders());
    assert_eq!(resolved.branch, default_branch());
    assert_eq!(resolved.provenance, None);
    assert_eq!(
        storage.table_probes(),
        vec![(default_branch(), table_id("out.c-123-main.orders"))]
    );
}

#[tokio::test]
async fn emulated_prefers_existing_branch_table() {
    let storage = FakeStorage::new();
    storage.add_table(&default_branch(), "out.c-123-main.orders", Backend::Snowflake);

    let resolved = emulated(&storage).rewrite_table(&orders()).await.unwrap();

    assert_eq!(resolved.physical, table_id("out.c-123-main.orders"));
    assert_eq!(resolved.original, table_id("out.c-main.orders"));
    assert_eq!(
        resolved.provenance.as_deref(),
        Some(r#"Using dev input "out.c-123-main.orders" instead of "out.c-main.orders"."#)
    );
}

#[tokio::test]
async fn rewriting_twice_gives_the_same_result() {
    let storage = FakeStorage::new();
    storage.add_table(&default_branch(), "out.c-123-main.orders", Backend::Snowflake);
    let rewriter = emulated(&storage);

    let first = rewriter.rewrite_table(&orders()).await.unwrap();
    let again = rewriter.rewrite_table(&first.unresolved()).await.unwrap();
    assert_eq!(again, first);

    // a source already pointing at the branch bucket is not prefixed again
    let probes = storage.table_probes().len();
    let physical = TableInput {
        source: first.physical.clone(),
        options: first.options.clone(),
    };
    let resolved = rewriter.rewrite_table(&physical).await.unwrap();
    assert_eq!(resolved.physical, first.physical);
    assert_eq!(storage.table_probes().len(), probes);
}

#[tokio::test]
async fn default_branch_passes_everything_through() {
    let storage = FakeStorage::new();
    let files = FileInput::tagged(vec![Tag::include("invoices")]);

    for native in [false, true] {
        let rewriter = rewriter_for(&default_context(native), storage.clone());
        let table = rewriter.rewrite_table(&orders()).await.unwrap();
        assert_eq!(table.physical, orders().source);
        assert_eq!(table.branch, default_branch());

        let resolved = rewriter.rewrite_files(&files).await.unwrap();
        assert_eq!(resolved.physical, files);
        assert_eq!(resolved.provenance, None);
    }
    assert!(storage.table_probes().is_empty());
    assert!(storage.file_probes().is_empty());
}

#[tokio::test]
async fn native_reads_from_branch_without_probing_default() {
    let storage = FakeStorage::new();
    storage.add_table(&dev_branch(), "out.c-main.orders", Backend::Snowflake);

    let resolved = native(&storage).rewrite_table(&orders()).await.unwrap();

    assert_eq!(resolved.branch, dev_branch());
    assert_eq!(resolved.physical, orders().source);
    assert_eq!(resolved.provenance, None);
    assert_eq!(
        storage.table_probes(),
        vec![(dev_branch(), table_id("out.c-main.orders"))]
    );
}

#[tokio::test]
async fn native_falls_back_to_default_branch() {
    let storage = FakeStorage::new();
    storage.add_table(&default_branch(), "out.c-main.orders", Backend::Snowflake);

    let resolved = native(&storage).rewrite_table(&orders()).await.unwrap();

    assert_eq!(resolved.branch, default_branch());
    assert_eq!(resolved.physical, orders().source);
    let note = resolved.provenance.expect("fallback is noted");
    assert!(note.contains("not found in branch 123"), "{note}");
    assert!(note.contains("default branch 100"), "{note}");
}

#[tokio::test]
async fn factory_follows_native_storage_flag() {
    let storage = FakeStorage::new();

    rewriter_for(&dev_context(true), storage.clone())
        .rewrite_table(&orders())
        .await
        .unwrap();
    assert_eq!(storage.table_probes()[0].1, table_id("out.c-main.orders"));

    rewriter_for(&dev_context(false), storage.clone())
        .rewrite_table(&orders())
        .await
        .unwrap();
    assert_eq!(storage.table_probes()[1].1, table_id("out.c-123-main.orders"));
}

#[tokio::test]
async fn processed_tags_follow_include_tags_into_branch() {
    let storage = FakeStorage::new();
    storage.add_file(&default_branch(), "invoice.csv", &["123-invoices"]);
    let input = FileInput {
        processed_tags: vec!["processed".into()],
        ..FileInput::tagged(vec![Tag::include("invoices"), Tag::exclude("processed")])
    };

    let resolved = emulated(&storage).rewrite_files(&input).await.unwrap();

    assert_eq!(
        resolved.physical.tags,
        vec![
            Tag::include("123-invoices"),
            Tag {
                name: "123-processed".into(),
                match_mode: TagMatch::Exclude
            }
        ]
    );
    assert_eq!(resolved.physical.processed_tags, vec!["123-processed"]);
    assert_eq!(resolved.original, input);
    assert!(resolved.provenance.is_some());
    assert_eq!(
        storage.file_probes(),
        vec![(default_branch(), r#"tags:"123-invoices""#.to_string())]
    );
}

#[tokio::test]
async fn emulated_keeps_production_tags_without_branch_files() {
    let storage = FakeStorage::new();
    storage.add_file(&default_branch(), "invoice.csv", &["invoices"]);
    let input = FileInput {
        processed_tags: vec!["processed".into()],
        ..FileInput::tagged(vec![Tag::include("invoices"), Tag::exclude("processed")])
    };

    let resolved = emulated(&storage).rewrite_files(&input).await.unwrap();

    assert_eq!(resolved.physical, input);
    assert_eq!(resolved.provenance, None);
}

#[tokio::test]
async fn emulated_rejects_file_queries_in_dev_branch() {
    let storage = FakeStorage::new();
    let input = FileInput {
        query: Some("name:report".into()),
        ..FileInput::tagged(vec![])
    };

    let err = emulated(&storage).rewrite_files(&input).await.unwrap_err();
    assert!(matches!(err, StagingError::BranchResolutionFailure { .. }));

    // fine on the default branch
    let rewriter = rewriter_for(&default_context(false), storage.clone());
    assert!(rewriter.rewrite_files(&input).await.is_ok());
}

#[tokio::test]
async fn native_file_lookup_falls_back_when_branch_has_no_files() {
    let storage = FakeStorage::new();
    storage.add_file(&default_branch(), "invoice.csv", &["invoices"]);
    let input = FileInput::tagged(vec![Tag::include("invoices")]);

    let resolved = native(&storage).rewrite_files(&input).await.unwrap();
    assert_eq!(resolved.branch, default_branch());
    assert_eq!(resolved.physical, input);
    assert!(resolved.provenance.is_some());

    storage.add_file(&dev_branch(), "invoice.csv", &["invoices"]);
    let resolved = native(&storage).rewrite_files(&input).await.unwrap();
    assert_eq!(resolved.branch, dev_branch());
    assert_eq!(resolved.provenance, None);
}

#[tokio::test]
async fn state_keys_follow_branch_tables() {
    let storage = FakeStorage::new();
    storage.add_table(&default_branch(), "out.c-123-main.orders", Backend::Snowflake);
    let untouched = SourceKey::table(&table_id("in.c-raw.events"));
    let prior = StateSnapshot::new()
        .with_entry(SourceKey::table(&table_id("out.c-main.orders")), Marker::new("M"))
        .with_entry(untouched.clone(), Marker::new("N"));

    let rewritten = emulated(&storage)
        .rewrite_state_destinations(&prior)
        .await
        .unwrap();

    assert_eq!(
        rewritten.get(&SourceKey::table(&table_id("out.c-123-main.orders"))),
        Some(&Marker::new("M"))
    );
    assert_eq!(rewritten.get(&untouched), Some(&Marker::new("N")));

    let same = native(&storage)
        .rewrite_state_destinations(&prior)
        .await
        .unwrap();
    assert_eq!(same, prior);
}

#[tokio::test]
async fn malformed_state_keys_fail_resolution() {
    let storage = FakeStorage::new();
    let prior = StateSnapshot::new().with_entry(SourceKey::Table("orders".into()), Marker::new("M"));

    for native in [false, true] {
        let err = rewriter_for(&dev_context(native), storage.clone())
            .rewrite_state_destinations(&prior)
            .await
            .unwrap_err();
        assert!(
            matches!(err, StagingError::BranchResolutionFailure { .. }),
            "{err:?}"
        );
    }
}

#[tokio::test]
async fn table_search_requires_exactly_one_match() {
    let storage = FakeStorage::new();
    storage.add_searchable(&default_branch(), "role", "orders", "out.c-main.orders");
    let search = |value: &str| TableSearchInput {
        key: "role".into(),
        value: value.into(),
        options: TableOptions::new("orders"),
    };

    let found = native(&storage).search_table(&search("orders")).await.unwrap();
    assert_eq!(found, table_id("out.c-main.orders"));

    let err = emulated(&storage).search_table(&search("missing")).await.unwrap_err();
    assert!(matches!(err, StagingError::InvalidSpecification { .. }));

    storage.add_searchable(&default_branch(), "role", "orders", "out.c-main.orders_v2");
    let err = emulated(&storage).search_table(&search("orders")).await.unwrap_err();
    assert!(err.to_string().contains("ambiguous"), "{err}");
}

#[tokio::test]
async fn native_branch_with_only_processed_files_stays_in_branch() {
    let storage = FakeStorage::new();
    storage.add_file(&dev_branch(), "branch.csv", &["invoices", "processed"]);
    storage.add_file(&default_branch(), "prod.csv", &["invoices"]);
    let input = FileInput {
        processed_tags: vec!["processed".into()],
        ..FileInput::tagged(vec![Tag::include("invoices"), Tag::exclude("processed")])
    };

    let resolved = native(&storage).rewrite_files(&input).await.unwrap();

    assert_eq!(resolved.branch, dev_branch());
    assert_eq!(resolved.physical, input);
    assert_eq!(resolved.provenance, None);
    assert_eq!(
        storage.file_probes(),
        vec![(dev_branch(), r#"tags:"invoices""#.to_string())]
    );
}
