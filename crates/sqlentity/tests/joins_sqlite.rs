//! Join graphs projected onto destination records.

mod common;

use common::{Author, Blog, BlogLine, Employee, Post, author, blog, context, post};
use sqlentity::prelude::*;
use sqlentity::ViewStore;
use tempfile::TempDir;

fn lines(db: &DataContext) -> Vec<BlogLine> {
    let graph = db
        .join::<Blog, Author>("b", "a", JoinKind::Inner)
        .unwrap()
        .on("AuthorId", "Id");
    let mut lines: Vec<BlogLine> = db.run_join(&graph).into_result().unwrap();
    lines.sort_by_key(|l| l.id);
    lines
}

#[test]
fn test_join_projects_by_column_name() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    let bob = author(&db, "Bob");
    let notes = blog(&db, "Notes", ada.id);
    let news = blog(&db, "News", bob.id);

    let lines = lines(&db);
    assert_eq!(lines.len(), 2);
    // Id comes from the first table bound
    assert_eq!(lines[0].id, notes.id);
    assert_eq!(lines[0].title, "Notes");
    assert_eq!(lines[0].name, "Ada");
    assert_eq!(lines[1].id, news.id);
    assert_eq!(lines[1].name, "Bob");
}

#[test]
fn test_join_excludes_soft_deleted_rows() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    let bob = author(&db, "Bob");
    blog(&db, "Notes", ada.id);
    blog(&db, "News", bob.id);
    db.delete(&bob).into_result().unwrap();

    let lines = lines(&db);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].name, "Ada");
}

#[test]
fn test_join_filters_each_side() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    let bob = author(&db, "Bob");
    blog(&db, "Notes", ada.id);
    blog(&db, "News", ada.id);
    blog(&db, "Nature", bob.id);

    let graph = db
        .join::<Blog, Author>("b", "a", JoinKind::Inner)
        .unwrap()
        .on("AuthorId", "Id")
        .where_first(Col::new("Title").starts_with("N"))
        .where_second(Col::new("Name").eq("Ada"));
    let mut found: Vec<BlogLine> = db.run_join(&graph).into_result().unwrap();
    found.sort_by(|x, y| x.title.cmp(&y.title));
    let titles: Vec<_> = found.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, ["News", "Notes"]);
}

#[test]
fn test_chained_join_with_pin() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    let notes = blog(&db, "Notes", ada.id);
    post(&db, notes.id, "Hello");

    // Title would come from Blog; pin it to Post
    let graph = db
        .join::<Blog, Author>("b", "a", JoinKind::Inner)
        .unwrap()
        .on("AuthorId", "Id")
        .then()
        .inner_join::<Blog, Post>("p")
        .unwrap()
        .on("Id", "BlogId")
        .pin::<Post>("Title");
    let found: Vec<BlogLine> = db.run_join(&graph).into_result().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "Hello");
    assert_eq!(found[0].name, "Ada");
}

#[test]
fn test_join_from_unbound_entity_is_ignored() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    blog(&db, "Notes", ada.id);

    let graph = db
        .join::<Blog, Author>("b", "a", JoinKind::Inner)
        .unwrap()
        .on("AuthorId", "Id")
        .then()
        .inner_join::<Post, Employee>("e")
        .unwrap();
    assert!(graph.plan().is_ignored());
    let found: Vec<BlogLine> = db.run_join(&graph).into_result().unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_stored_view_runs_later() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    blog(&db, "Notes", ada.id);

    let mut views = ViewStore::new();
    db.join::<Blog, Author>("b", "a", JoinKind::Left)
        .unwrap()
        .on("AuthorId", "Id")
        .store_as_view::<BlogLine>(&mut views, db.source())
        .unwrap();

    let view = views.get::<BlogLine>(db.source()).unwrap();
    let found: Vec<BlogLine> = db.run_view(view).into_result().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Ada");
    assert!(views.get::<BlogLine>("other.db").is_none());
}

// ==================== Self Joins ====================

/// One name out of a chain of employees.
#[derive(Debug, Default)]
struct Reporting {
    name: String,
}

impl Record for Reporting {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("Name", ColumnType::Text)];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        if index == 0 {
            self.name = FromValue::from_value(value)?;
        }
        Ok(())
    }
}

fn employee(db: &DataContext, name: &str, manager: Option<i64>) -> Employee {
    let mut employee = Employee {
        name: name.to_string(),
        manager_id: manager,
        ..Employee::default()
    };
    db.insert(&mut employee).into_result().unwrap();
    employee
}

#[test]
fn test_self_join_gets_distinct_aliases() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let boss = employee(&db, "Grace", None);
    let lead = employee(&db, "Linus", Some(boss.id));
    employee(&db, "Ken", Some(lead.id));

    let graph = db
        .join::<Employee, Employee>("e", "e", JoinKind::Inner)
        .unwrap()
        .on("ManagerId", "Id")
        .then()
        .inner_join::<Employee, Employee>("e")
        .unwrap()
        .on("ManagerId", "Id");
    assert_eq!(graph.plan().aliases(), ["e", "e1", "e2"]);

    let found: Vec<Reporting> = db.run_join(&graph).into_result().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Ken");

    // The latest Employee binding is the top of the chain
    let pinned = graph.pin::<Employee>("Name");
    let found: Vec<Reporting> = db.run_join(&pinned).into_result().unwrap();
    assert_eq!(found[0].name, "Grace");
}
