use futures::TryStreamExt;
use quarry_reconcile::{FileDifferenceType, FolderDifferenceType, SyncOptions, get_differences, sync_folder_to};
use quarry_storage::backend::{ArchiveBackend, Backend, KvBackend, MemoryKv};
use quarry_storage::{Content, File, Storage, UntrustedLimits, create_storage_from_untrusted_string};
use rstest::rstest;
use std::sync::Arc;

fn kv(name: &str) -> Storage {
    Storage::new(KvBackend::new(name, MemoryKv::default()).into_handle())
}

async fn tree(name: &str, files: &[(&str, &str)]) -> Storage {
    let storage = kv(name);
    let root = storage.root_folder();
    for (path, text) in files {
        root.ensure_file_from_relative_path(path).unwrap().set_content(*text).unwrap();
    }
    root.save_all().await.unwrap();
    Storage::new(storage.backend().clone())
}

async fn read(storage: &Storage, path: &str) -> Option<Content> {
    let file = storage.root_folder().get_file_from_relative_path(path).await.unwrap()?;
    file.load_content(true).await.unwrap();
    file.content().unwrap()
}

const PACK: &[(&str, &str)] = &[
    ("/manifest.json", r#"{"format_version": 2, "header": {"name": "pack"}}"#),
    ("/texts/en_US.lang", "pack.name=Pack"),
    ("/entities/cow.json", r#"{"minecraft:entity": {}}"#),
];

#[tokio::test]
async fn json_contents_difference() {
    let a = tree("a", &[("/x.json", r#"{"a":1}"#)]).await;
    let b = tree("b", &[("/x.json", r#"{"a":2}"#)]).await;
    let set = get_differences(&a.root_folder(), &b.root_folder(), true, false).await.unwrap();
    assert_eq!(set.file_difference_count(), 1);
    let difference = &set.file_differences()[0];
    assert_eq!(difference.kind, FileDifferenceType::ContentsDifferent);
    assert_eq!(difference.path, "/x.json");
}

#[tokio::test]
async fn sync_removes_stale_target_files() {
    let source = tree("source", &[("/fresh.txt", "new")]).await;
    let target = tree("target", &[("/stale.txt", "old")]).await;
    let options = SyncOptions { remove_on_target: true, ..SyncOptions::default() };
    let modified = sync_folder_to(&source.root_folder(), &target.root_folder(), &options, None).await.unwrap();
    assert!(modified >= 1);
    assert!(read(&target, "/stale.txt").await.is_none());
    assert!(target.backend().read("/stale.txt", quarry_storage::Encoding::Text).await.unwrap().is_none());
    assert_eq!(read(&target, "/fresh.txt").await, Some(Content::from("new")));
}

#[tokio::test]
async fn identical_set_content_records_no_version() {
    let storage = kv("versions");
    let file = storage.root_folder().ensure_file("icon.png").unwrap();
    assert!(file.set_content(vec![1u8, 2, 3]).unwrap());
    assert!(!file.set_content(vec![1u8, 2, 3]).unwrap());
    assert_eq!(file.versions().unwrap().len(), 1);
    assert_eq!(storage.versions().unwrap().len(), 1);
}

#[rstest]
#[case::text("/texts/en_US.lang", Content::from("a=b\nc=d"))]
#[case::binary("/textures/icon.png", Content::Bytes(vec![0x89, b'P', b'N', b'G', 0, 255]))]
#[tokio::test]
async fn content_round_trip(#[case] path: &str, #[case] content: Content) {
    let storage = kv("round-trip");
    let file = storage.root_folder().ensure_file_from_relative_path(path).unwrap();
    file.set_content(content.clone()).unwrap();
    file.save_content().await.unwrap();
    file.load_content(true).await.unwrap();
    assert_eq!(file.content().unwrap(), Some(content));
}

#[tokio::test]
async fn diff_is_reflexive() {
    let a = tree("a", PACK).await;
    let set = get_differences(&a.root_folder(), &a.root_folder(), true, true).await.unwrap();
    assert!(!set.has_differences());
    let zip = set.get_zip().await.unwrap();
    zip.root_folder().load(false).await.unwrap();
    assert_eq!(zip.root_folder().file_count().unwrap(), 0);
    assert_eq!(zip.root_folder().folder_count().unwrap(), 0);
}

#[tokio::test]
async fn patch_reproduces_updated_tree() {
    let a = tree("a", PACK).await;
    let b = tree(
        "b",
        &[
            ("/manifest.json", r#"{"format_version": 2, "header": {"name": "renamed"}}"#),
            ("/texts/en_US.lang", "pack.name=Pack"),
            ("/texts/de_DE.lang", "pack.name=Paket"),
            ("/functions/tick.mcfunction", "say hi"),
        ],
    )
    .await;
    let set = get_differences(&a.root_folder(), &b.root_folder(), true, false).await.unwrap();

    let copy = tree("copy", PACK).await;
    let written = set.copy_file_updates_and_adds(&copy).await.unwrap();
    assert_eq!(written, 3);
    for difference in set.updates_and_adds() {
        let expected = read(&b, &difference.path).await;
        assert!(expected.is_some());
        assert_eq!(read(&copy, &difference.path).await, expected, "{}", difference.path);
    }
    // Deletions aren't part of a patch.
    assert!(read(&copy, "/entities/cow.json").await.is_some());
    assert_eq!(set.copy_file_updates_and_adds(&copy).await.unwrap(), 0);
}

#[tokio::test]
async fn patch_travels_as_zip_and_shareable_string() {
    let a = tree("a", &[("/manifest.json", "{}")]).await;
    let b = tree("b", &[("/manifest.json", r#"{"v":1}"#), ("/texts/en_US.lang", "a=b")]).await;
    let set = get_differences(&a.root_folder(), &b.root_folder(), false, false).await.unwrap();

    let zip = set.get_zip().await.unwrap();
    assert_eq!(read(&zip, "/texts/en_US.lang").await, Some(Content::from("a=b")));

    let archive = quarry_archive::Archive::decode(&set.to_zip_bytes().await.unwrap()).unwrap();
    let reopened = Storage::new(Arc::new(ArchiveBackend::new("reopened", archive)));
    assert_eq!(read(&reopened, "/manifest.json").await, Some(Content::from(r#"{"v":1}"#)));

    let shared = set.to_shareable_string().await.unwrap();
    let untrusted = create_storage_from_untrusted_string(&shared, &UntrustedLimits::default()).unwrap();
    assert!(untrusted.read_only());
    let files: Vec<File> = untrusted.root_folder().files_recursive().try_collect().await.unwrap();
    let paths: Vec<String> = files.iter().map(|file| file.path().unwrap()).collect();
    assert_eq!(paths, vec!["/manifest.json".to_string(), "/texts/en_US.lang".to_string()]);
}

#[tokio::test]
async fn sync_is_idempotent() {
    let source = tree("source", PACK).await;
    let target = tree("target", &[("/old.json", "{}")]).await;
    let options = SyncOptions { force_folders: true, remove_on_target: true, ..SyncOptions::default() };
    let first = sync_folder_to(&source.root_folder(), &target.root_folder(), &options, None).await.unwrap();
    assert_eq!(first, 4);
    let second = sync_folder_to(&source.root_folder(), &target.root_folder(), &options, None).await.unwrap();
    assert_eq!(second, 0);

    let set = get_differences(&source.root_folder(), &target.root_folder(), true, false).await.unwrap();
    assert!(!set.has_differences());
}

/// Apply a full difference set (updates, adds and deletions) onto `target`.
async fn apply(set: &quarry_reconcile::DifferenceSet, target: &Storage) {
    set.copy_file_updates_and_adds(target).await.unwrap();
    let root = target.root_folder();
    for difference in set.file_differences() {
        if difference.kind == FileDifferenceType::FileDeleted
            && let Some(file) = root.get_file_from_relative_path(&difference.path).await.unwrap()
        {
            file.delete().await.unwrap();
        }
    }
    for difference in set.folder_differences() {
        if difference.kind.contains(FolderDifferenceType::FOLDER_DELETED)
            && let Some(folder) = root.get_folder_from_relative_path(&difference.path).await.unwrap()
        {
            folder.delete_this_folder().await.unwrap();
        }
    }
}

fn added_paths(set: &quarry_reconcile::DifferenceSet) -> Vec<&str> {
    set.file_differences()
        .iter()
        .filter(|difference| difference.kind == FileDifferenceType::FileAdded)
        .map(|difference| difference.path.as_str())
        .collect()
}

#[tokio::test]
async fn renamed_single_child_folders_keep_original_paths() {
    let a = tree("a", &[("/x/a/keep.json", "{}")]).await;
    let b = tree("b", &[("/a/b/keep.json", "{}"), ("/a/b/new.json", r#"{"n":1}"#)]).await;
    let set = get_differences(&a.root_folder(), &b.root_folder(), true, true).await.unwrap();
    assert_eq!(added_paths(&set), vec!["/x/a/new.json"]);
}

#[rstest]
#[case::repeated_names(
    &[("/x/a/keep.json", "{}")],
    &[("/a/b/keep.json", "{}"), ("/a/b/new.json", r#"{"n":1}"#)],
    &["/x/a/new.json"]
)]
#[case::nested_template(
    &[
        ("/starter/pack/manifest.json", r#"{"v":1}"#),
        ("/starter/pack/old.lang", "x=y"),
        ("/starter/pack/legacy/a.json", "{}"),
        ("/starter/pack/texts/en_US.lang", "a=b"),
    ],
    &[
        ("/pack/starter/manifest.json", r#"{"v":2}"#),
        ("/pack/starter/texts/en_US.lang", "a=b"),
        ("/pack/starter/functions/tick.mcfunction", "say hi"),
    ],
    &["/starter/pack/functions/tick.mcfunction"]
)]
#[case::added_subtree_named_like_original(
    &[("/one/pack/a.json", "{}")],
    &[("/two/other/a.json", "{}"), ("/two/other/pack/b.json", "{}")],
    &["/one/pack/pack/b.json"]
)]
#[tokio::test]
async fn patch_reproduces_renamed_template(
    #[case] original: &[(&str, &str)],
    #[case] updated: &[(&str, &str)],
    #[case] expected_added: &[&str],
) {
    let a = tree("a", original).await;
    let b = tree("b", updated).await;
    let set = get_differences(&a.root_folder(), &b.root_folder(), true, true).await.unwrap();
    assert_eq!(added_paths(&set), expected_added);

    let copy = tree("copy", original).await;
    apply(&set, &copy).await;
    let copy = Storage::new(copy.backend().clone());

    for difference in set.updates_and_adds() {
        let expected = difference.updated.as_ref().unwrap();
        expected.load_content(false).await.unwrap();
        assert_eq!(read(&copy, &difference.path).await, expected.content().unwrap(), "{}", difference.path);
    }
    let patched: Vec<File> = copy.root_folder().files_recursive().try_collect().await.unwrap();
    let wanted: Vec<File> = b.root_folder().files_recursive().try_collect().await.unwrap();
    assert_eq!(patched.len(), wanted.len());

    let again = get_differences(&copy.root_folder(), &b.root_folder(), true, true).await.unwrap();
    assert!(!again.has_differences(), "{:?}", again.file_differences().iter().map(|d| &d.path).collect::<Vec<_>>());
}
