//! Alias behaviour of the shared resource table

use std::sync::Arc;

use webarchive_singlefile::{Aliases, Resource, ResourceTable};

mod common;

#[test]
fn relative_and_absolute_aliases_reach_the_same_blob() {
    let aliases = Aliases::from_base_str("http://ex.com/dir/page.html");
    let table = ResourceTable::new();

    let references = [
        "http://ex.com/img/logo.png",
        "//ex.com/img/a%20b.png?v=2",
        "https://cdn.ex.com/font.woff2#x",
    ];
    for (i, reference) in references.iter().enumerate() {
        let resource = Resource::new("image/png", *reference, vec![i as u8; 4]);
        assert!(table.insert(aliases.forms(reference), resource).is_some());
    }

    for reference in references {
        let [relative, absolute] = aliases.forms(reference);
        let by_relative = table.get(&relative).expect("relative alias");
        let by_absolute = table.get(&absolute).expect("absolute alias");
        assert!(Arc::ptr_eq(&by_relative, &by_absolute));
        assert_eq!(by_relative.data(), by_absolute.data());
        assert_eq!(by_relative.mime_type(), by_absolute.mime_type());
    }
}

#[test]
fn declared_resources_win_over_later_captures() {
    let table = ResourceTable::new();
    table.insert(
        ["http://ex.com/a.css"],
        Resource::new("text/css", "http://ex.com/a.css", "declared"),
    );

    let late = table.insert(
        ["http://ex.com/a.css", "/a.css"],
        Resource::new("text/css", "http://ex.com/a.css", "captured"),
    );

    // The new key is filled, the bound one keeps its blob
    assert!(late.is_some());
    assert_eq!(table.get("http://ex.com/a.css").unwrap().text(), "declared");
    assert_eq!(table.get("/a.css").unwrap().text(), "captured");
}

#[test]
fn reset_invalidates_cached_data_uri() {
    let table = ResourceTable::new();
    let id = table
        .insert(["k"], Resource::new("text/css", "http://ex.com/k.css", "a{}"))
        .unwrap();
    let before = table.get("k").unwrap().data_uri().to_string();

    assert!(table.reset_data(id, "b{}"));
    let after = table.get("k").unwrap().data_uri().to_string();

    assert_ne!(before, after);
    assert_eq!(common::data_uri_bytes(&after), b"b{}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_bind_each_key_once() {
    let table = Arc::new(ResourceTable::new());
    let mut tasks = Vec::new();
    for writer in 0..16u8 {
        let table = Arc::clone(&table);
        tasks.push(tokio::spawn(async move {
            for n in 0..50 {
                let url = format!("http://ex.com/{n}.png");
                table.insert([url.clone()], Resource::new("image/png", url, vec![writer]));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(table.len(), 50);
    assert_eq!(table.key_count(), 50);
}
