use crate::backend::{Backend, BackendHandle, KvBackend, Listing, MemoryKv};
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use crate::events::StorageEvent;
use crate::model::Storage;
use async_trait::async_trait;
use futures::TryStreamExt;
use rstest::rstest;

fn kv() -> (MemoryKv, BackendHandle) {
    let store = MemoryKv::default();
    (store.clone(), KvBackend::new("test", store).into_handle())
}

fn storage() -> Storage {
    Storage::new(kv().1)
}

/// Every call fails the way an unreachable server does.
struct Unreachable;

#[async_trait]
impl Backend for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn list(&self, folder: &str) -> Result<Listing> {
        exn::bail!(ErrorKind::Network(format!("{folder}: connection refused")))
    }

    async fn read(&self, path: &str, _encoding: Encoding) -> Result<Option<Content>> {
        exn::bail!(ErrorKind::Network(format!("{path}: connection refused")))
    }

    async fn write(&self, path: &str, _content: &Content) -> Result<()> {
        exn::bail!(ErrorKind::Network(format!("{path}: connection refused")))
    }

    async fn delete_file(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_folder(&self, _folder: &str) -> Result<()> {
        Ok(())
    }
}

#[rstest]
#[case("/notes/readme.md", Content::from("hello\nworld"))]
#[case("/textures/stone.png", Content::Bytes(vec![0x89u8, 0x50, 0x4e, 0x47, 0x00, 0xff]))]
#[tokio::test]
async fn test_content_round_trip(#[case] path: &str, #[case] content: Content) {
    let (store, handle) = kv();
    let file = Storage::new(handle.clone()).root_folder().ensure_file_from_relative_path(path).unwrap();
    assert!(file.set_content(content.clone()).unwrap());
    assert!(file.needs_save().unwrap());
    file.save_content().await.unwrap();
    assert!(!file.needs_save().unwrap());
    file.load_content(true).await.unwrap();
    assert_eq!(file.content().unwrap(), Some(content.clone()));

    // And through a fresh tree over the same store.
    let fresh = Storage::new(KvBackend::new("test", store).into_handle());
    let file = fresh.root_folder().get_file_from_relative_path(path).await.unwrap().unwrap();
    file.load_content(false).await.unwrap();
    assert_eq!(file.content().unwrap(), Some(content));
}

#[tokio::test]
async fn test_identical_content_is_not_a_change() {
    let storage = storage();
    let file = storage.root_folder().ensure_file("data.bin").unwrap();
    assert!(file.set_content(vec![1u8, 2, 3]).unwrap());
    file.save_content().await.unwrap();
    assert!(!file.set_content(vec![1u8, 2, 3]).unwrap());
    assert_eq!(storage.versions().unwrap().len(), 1);
    assert_eq!(file.versions().unwrap().len(), 1);
    assert!(!file.needs_save().unwrap());
}

#[tokio::test]
async fn test_read_only_storage_rejects_mutation() {
    let (_, handle) = kv();
    handle.write("/a.json", &Content::from("{}")).await.unwrap();
    let storage = Storage::with_read_only(handle, true);
    let root = storage.root_folder();
    let file = root.get_file_from_relative_path("/a.json").await.unwrap().unwrap();
    file.load_content(false).await.unwrap();

    let err = file.set_content("[]").unwrap_err();
    assert!(matches!(&*err, ErrorKind::ReadOnly(_)));
    assert!(file.save_content().await.is_err());
    assert!(root.delete_file("a.json").await.is_err());
    assert!(root.save_all().await.is_err());
    assert_eq!(file.content().unwrap(), Some(Content::from("{}")));
}

#[tokio::test]
async fn test_disposed_handles_fail_fast() {
    let storage = storage();
    let folder = storage.root_folder().ensure_folder_from_relative_path("/a/b/").unwrap();
    let file = folder.ensure_file("x.json").unwrap();
    folder.dispose().unwrap();
    assert!(folder.is_disposed());
    assert!(file.is_disposed());
    let err = file.name().unwrap_err();
    assert!(matches!(&*err, ErrorKind::Disposed(_)));
    // The rest of the tree is unaffected.
    assert!(storage.root_folder().folder("a").unwrap().is_some());

    storage.root_folder().dispose().unwrap();
    assert!(storage.is_disposed());
    assert!(storage.root_folder().load(false).await.is_err());
    assert!(storage.root_folder().ensure_file("y.json").is_err());
}

#[tokio::test]
async fn test_events() {
    let storage = storage();
    let mut events = storage.subscribe();
    let file = storage.root_folder().ensure_file("a.json").unwrap();
    file.set_content("{}").unwrap();
    file.set_content("{}").unwrap();
    file.dispose().unwrap();
    assert_eq!(events.try_recv().unwrap(), StorageEvent::FileAdded { path: "/a.json".into() });
    assert_eq!(events.try_recv().unwrap(), StorageEvent::FileContentsUpdated { path: "/a.json".into() });
    assert_eq!(events.try_recv().unwrap(), StorageEvent::FileRemoved { path: "/a.json".into() });
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_load_is_cached_until_forced() {
    let (_, handle) = kv();
    handle.write("/a.json", &Content::from("{}")).await.unwrap();
    handle.write("/b.json", &Content::from("{}")).await.unwrap();
    handle.write("/skip.exe", &Content::from("MZ")).await.unwrap();
    let storage = Storage::new(handle.clone());
    let root = storage.root_folder();
    let first = root.load(false).await.unwrap();
    assert_eq!(root.file_count().unwrap(), 2);

    handle.delete_file("/b.json").await.unwrap();
    root.ensure_file("draft.json").unwrap().set_content("{}").unwrap();
    assert_eq!(root.load(false).await.unwrap(), first);
    assert_eq!(root.file_count().unwrap(), 3);

    root.load(true).await.unwrap();
    let names: Vec<String> = root.files().unwrap().iter().map(|f| f.name().unwrap()).collect();
    // Unsaved files survive a forced reload.
    assert_eq!(names, vec!["a.json", "draft.json"]);
}

#[rstest]
#[case("constructor", "__constructor")]
#[case("%20pack%20", "pack")]
#[case("/nested/", "nested")]
fn test_children_are_keyed_by_canonical_name(#[case] name: &str, #[case] key: &str) {
    let storage = storage();
    let root = storage.root_folder();
    let first = root.ensure_folder(name).unwrap();
    assert_eq!(root.folder(key).unwrap(), Some(first.clone()));
    assert_eq!(root.ensure_folder(key).unwrap(), first);
    assert_eq!(root.folder_count().unwrap(), 1);
}

#[tokio::test]
async fn test_relative_paths() {
    let storage = storage();
    let root = storage.root_folder();
    assert!(root.get_file_from_relative_path("/a/b/c.json").await.unwrap().is_none());
    assert!(root.get_folder_from_relative_path("/a/").await.unwrap().is_none());

    let file = root.ensure_file_from_relative_path("/a/b/c.json").unwrap();
    assert_eq!(file.path().unwrap(), "/a/b/c.json");
    assert_eq!(file.folder().unwrap().path().unwrap(), "/a/b/");
    let found = root.get_file_from_relative_path("/a/b/c.json").await.unwrap();
    assert_eq!(found, Some(file));
    let folder = root.get_folder_from_relative_path("/a/b/").await.unwrap().unwrap();
    assert_eq!(folder.name().unwrap(), "b");
    assert_eq!(root.get_folder_from_relative_path("/").await.unwrap(), Some(root.clone()));

    let err = root.get_file_from_relative_path("a/b/c.json").await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    assert!(root.ensure_folder_from_relative_path("a").is_err());
}

#[tokio::test]
async fn test_version_restore_and_trim() {
    let storage = storage();
    let file = storage.root_folder().ensure_file("doc.txt").unwrap();
    for text in ["A", "B", "C"] {
        file.set_content(text).unwrap();
    }
    let versions = storage.versions().unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(versions[1].content, Some(Content::from("A")));
    assert_eq!(storage.file_for_version(versions[1].id).unwrap(), Some(file.clone()));

    assert_eq!(storage.set_to_version(versions[1].id).unwrap(), 2);
    assert_eq!(file.content().unwrap(), Some(Content::from("A")));
    assert!(file.needs_save().unwrap());
    // Restoring is not itself recorded.
    assert_eq!(storage.versions().unwrap().len(), 3);

    assert_eq!(storage.trim_after_version(versions[0].id).unwrap(), 2);
    assert_eq!(storage.versions().unwrap().len(), 1);
    assert_eq!(file.versions().unwrap(), vec![versions[0].id]);

    let err = storage.set_to_version(versions[2].id).unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotFound(_)));
}

#[tokio::test]
async fn test_versionless_edit() {
    let storage = storage();
    let file = storage.root_folder().ensure_file("doc.txt").unwrap();
    assert!(file.set_content_versionless("draft").unwrap());
    assert!(storage.versions().unwrap().is_empty());
    assert!(file.needs_save().unwrap());
}

#[tokio::test]
async fn test_soft_failures_are_recorded() {
    let storage = Storage::new(Unreachable.into_handle());
    let root = storage.root_folder();
    root.load(false).await.unwrap();
    assert!(root.error_status().unwrap().unwrap().contains("connection refused"));
    assert!(root.last_processed().unwrap().is_some());

    let file = root.ensure_file("a.json").unwrap();
    file.load_content(false).await.unwrap();
    assert!(file.is_in_error_state().unwrap());
    assert!(file.content().unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_json_is_flagged_but_readable() {
    let (_, handle) = kv();
    handle.write("/broken.json", &Content::from("{ not json")).await.unwrap();
    let file = Storage::new(handle).root_folder().ensure_file("broken.json").unwrap();
    file.load_content(false).await.unwrap();
    assert!(file.is_in_error_state().unwrap());
    assert!(file.error_state_message().unwrap().unwrap().starts_with("invalid JSON"));
    assert_eq!(file.content().unwrap(), Some(Content::from("{ not json")));
}

#[tokio::test]
async fn test_save_all_and_delete() {
    let (_, handle) = kv();
    let storage = Storage::new(handle.clone());
    let root = storage.root_folder();
    root.ensure_file_from_relative_path("/a/one.json").unwrap().set_content("1").unwrap();
    root.ensure_file_from_relative_path("/a/b/two.json").unwrap().set_content("2").unwrap();
    root.ensure_file("untouched.json").unwrap();
    assert_eq!(root.save_all().await.unwrap(), 2);
    assert_eq!(root.save_all().await.unwrap(), 0);
    assert!(handle.read("/a/b/two.json", Encoding::Text).await.unwrap().is_some());

    let a = root.folder("a").unwrap().unwrap();
    assert!(a.delete_file("one.json").await.unwrap());
    assert!(!a.delete_file("one.json").await.unwrap());
    a.delete_this_folder().await.unwrap();
    assert!(a.is_disposed());
    assert!(handle.read("/a/b/two.json", Encoding::Text).await.unwrap().is_none());
    assert!(root.delete_this_folder().await.is_err());
}

#[tokio::test]
async fn test_move_folder() {
    let (_, handle) = kv();
    let storage = Storage::new(handle.clone());
    let root = storage.root_folder();
    root.ensure_file_from_relative_path("/old/x.json").unwrap().set_content("{}").unwrap();
    root.ensure_file_from_relative_path("/old/deep/y.txt").unwrap().set_content("y").unwrap();
    root.save_all().await.unwrap();
    let mut events = storage.subscribe();

    let moved = root.folder("old").unwrap().unwrap().move_to("/new/place/").await.unwrap();
    assert_eq!(moved.path().unwrap(), "/new/place/");
    assert_eq!(handle.read("/new/place/deep/y.txt", Encoding::Text).await.unwrap(), Some(Content::from("y")));
    assert!(handle.read("/old/x.json", Encoding::Text).await.unwrap().is_none());
    assert!(root.folder("old").unwrap().is_none());

    let mut saw_move = false;
    while let Ok(event) = events.try_recv() {
        saw_move |= matches!(event, StorageEvent::FolderMoved { ref from, ref to } if from == "/old/" && to == "/new/place/");
    }
    assert!(saw_move);
}

#[tokio::test]
async fn test_files_recursive_is_depth_first() {
    let (_, handle) = kv();
    for path in ["/z.json", "/a/one.json", "/a/b/two.json", "/c/three.json"] {
        handle.write(path, &Content::from("{}")).await.unwrap();
    }
    let storage = Storage::new(handle);
    let files: Vec<_> = storage.root_folder().files_recursive().try_collect().await.unwrap();
    let paths: Vec<String> = files.iter().map(|f| f.path().unwrap()).collect();
    assert_eq!(paths, vec!["/z.json", "/a/one.json", "/a/b/two.json", "/c/three.json"]);
}

#[tokio::test]
async fn test_reload_after_external_update() {
    let (_, handle) = kv();
    handle.write("/a.json", &Content::from("1")).await.unwrap();
    let storage = Storage::new(handle.clone());
    let root = storage.root_folder();
    let file = root.get_file_from_relative_path("/a.json").await.unwrap().unwrap();
    file.load_content(false).await.unwrap();

    handle.write("/a.json", &Content::from("2")).await.unwrap();
    handle.write("/b.json", &Content::from("3")).await.unwrap();
    file.load_content(false).await.unwrap();
    assert_eq!(file.content().unwrap(), Some(Content::from("1")));

    root.reload_after_external_update().await.unwrap();
    assert_eq!(file.content().unwrap(), Some(Content::from("2")));
    assert_eq!(root.file_count().unwrap(), 2);
}

#[tokio::test]
async fn test_container_storage_round_trip() {
    let (store, handle) = kv();
    let storage = Storage::new(handle);
    let pack = storage.root_folder().ensure_file("pack.mcpack").unwrap();
    assert!(storage.root_folder().ensure_file("plain.json").unwrap().container_storage().await.unwrap().is_none());

    let inner = pack.container_storage().await.unwrap().unwrap();
    assert_eq!(pack.container_storage().await.unwrap(), Some(inner.clone()));
    inner.root_folder().ensure_file_from_relative_path("/texts/en_US.lang").unwrap().set_content("a=b").unwrap();
    assert!(pack.save_container().await.unwrap());
    pack.save_content().await.unwrap();

    let reopened = Storage::new(KvBackend::new("test", store).into_handle());
    let pack = reopened.root_folder().get_file_from_relative_path("/pack.mcpack").await.unwrap().unwrap();
    let inner = pack.container_storage().await.unwrap().unwrap();
    let lang = inner.root_folder().get_file_from_relative_path("/texts/en_US.lang").await.unwrap().unwrap();
    lang.load_content(false).await.unwrap();
    assert_eq!(lang.content().unwrap(), Some(Content::from("a=b")));
}
