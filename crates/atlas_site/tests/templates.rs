//! Template cache behavior across include chains.

use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use atlas_config::TemplateConfig;
use atlas_shake::ShakeError;
use atlas_site::TemplateCache;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn bump(path: &Path) {
    let modified = fs::metadata(path).unwrap().modified().unwrap();
    File::open(path)
        .unwrap()
        .set_modified(modified + Duration::from_secs(2))
        .unwrap();
}

fn templates(dir: &Path, files: &[(&str, &str)]) -> TemplateCache {
    for (name, body) in files {
        fs::write(dir.join(format!("{name}.tmpl")), body).unwrap();
    }
    TemplateCache::new(TemplateConfig {
        html_path: dir.to_path_buf(),
        extension: "tmpl".to_string(),
    })
}

const CHAIN: &[(&str, &str)] = &[
    ("page", r#"<html>{{template "layout" .}}</html>"#),
    ("layout", r#"{{if .Nav}}{{template "nav" .Nav}}{{end}}<main/>"#),
    ("nav", "<nav/>"),
    ("other", "<p>standalone</p>"),
];

#[test]
fn repeated_make_is_idempotent() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut cache = templates(dir.path(), CHAIN);

    assert!(cache.make("page").unwrap());
    assert!(!cache.make("page").unwrap());
    assert!(!cache.make("layout").unwrap());
    assert!(!cache.make("nav").unwrap());
}

#[test]
fn includes_are_merged_transitively() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut cache = templates(dir.path(), CHAIN);
    cache.make("page").unwrap();

    let page = cache.get("page").unwrap();
    assert_eq!(page.deps, vec!["layout"]);
    assert_eq!(
        page.template.names().collect::<Vec<_>>(),
        vec!["layout", "nav", "page"]
    );
    assert_eq!(cache.get("layout").unwrap().deps, vec!["nav"]);
}

#[test]
fn touching_a_leaf_rebuilds_every_includer() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut cache = templates(dir.path(), CHAIN);
    cache.make("page").unwrap();
    cache.make("other").unwrap();
    let page_stamp = cache.get("page").unwrap().stamp;

    fs::write(dir.path().join("nav.tmpl"), "<nav>v2</nav>").unwrap();
    bump(&dir.path().join("nav.tmpl"));

    assert!(cache.make("page").unwrap());
    assert!(!cache.make("layout").unwrap());
    assert!(!cache.make("other").unwrap());

    let page = cache.get("page").unwrap();
    assert_eq!(page.stamp, page_stamp);
    let nav = page.template.lookup("nav").unwrap();
    assert_eq!(nav.root, vec![atlas_site::template::Node::Text("<nav>v2</nav>".into())]);
}

#[test]
fn include_cycle_is_an_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut cache = templates(
        dir.path(),
        &[
            ("a", r#"{{template "b"}}"#),
            ("b", r#"{{with .X}}{{template "a"}}{{end}}"#),
        ],
    );

    let err = cache.make("a").unwrap_err();
    assert!(matches!(err, ShakeError::Cycle { ref key } if key.as_str() == "atlas-template://a"));
    assert!(cache.get("a").is_none());
    assert!(cache.get("b").is_none());
    assert!(cache.rules().is_empty());
}

#[test]
fn self_include_is_an_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut cache = templates(dir.path(), &[("loop", r#"{{template "loop"}}"#)]);
    assert!(matches!(cache.make("loop"), Err(ShakeError::Cycle { .. })));
}

#[test]
fn deleted_include_fails_and_keeps_the_old_entry() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut cache = templates(dir.path(), CHAIN);
    cache.make("page").unwrap();

    fs::remove_file(dir.path().join("nav.tmpl")).unwrap();
    assert!(matches!(cache.make("page"), Err(ShakeError::Io { .. })));
    assert!(cache.get("page").is_some());
}

#[test]
fn fixing_a_broken_template_recovers() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut cache = templates(dir.path(), &[("page", "{{range .Items}}")]);
    assert!(matches!(cache.make("page"), Err(ShakeError::Parse { .. })));

    fs::write(dir.path().join("page.tmpl"), "{{range .Items}}{{.}}{{end}}").unwrap();
    assert!(cache.make("page").unwrap());
    assert!(cache.get("page").unwrap().deps.is_empty());
}

#[test]
fn absolute_include_is_rejected() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let html = dir.path().join("html");
    fs::create_dir(&html).unwrap();
    fs::write(dir.path().join("secret.tmpl"), "<p>secret</p>").unwrap();
    let secret = dir.path().join("secret");
    let page = format!("{{{{template {:?}}}}}", secret.display().to_string());
    let mut cache = templates(&html, &[("page", page.as_str())]);

    let err = cache.make("page").unwrap_err();
    assert!(
        matches!(err, ShakeError::BadQuestion { ref key } if key.as_str().ends_with("/secret"))
    );
    assert!(cache.get("page").is_none());
    assert!(cache.rules().is_empty());
}
