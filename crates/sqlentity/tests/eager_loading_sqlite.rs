//! Object graphs loaded with one statement and collapsed by identity.

mod common;

use common::{Author, Blog, Comment, Post, author, blog, comment, context, post};
use sqlentity::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

fn blog_plan(db: &DataContext) -> IncludePlan<Blog> {
    db.include::<Blog>()
        .unwrap()
        .include_many::<Post, _>("Posts", |blog, post| blog.posts.push(post))
        .unwrap()
        .include_one::<Author, _>("Author", |blog, author| blog.author = Some(author))
        .unwrap()
        .include_many_from::<Post, Comment, _>(1, "Comments", |post, c| post.comments.push(c))
        .unwrap()
}

fn titles(blog: &EntityRef<Blog>) -> Vec<String> {
    let blog = blog.read().unwrap();
    let mut titles: Vec<_> = blog
        .posts
        .iter()
        .map(|p| p.read().unwrap().title.clone())
        .collect();
    titles.sort();
    titles
}

#[test]
fn test_duplicate_rows_collapse_to_one_instance() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    let notes = blog(&db, "Notes", ada.id);
    let first = post(&db, notes.id, "First");
    let second = post(&db, notes.id, "Second");
    comment(&db, first.id, "a");
    comment(&db, first.id, "b");
    comment(&db, second.id, "c");

    let blogs = db.fetch_graph(&blog_plan(&db), None).into_result().unwrap();

    // Three joined rows, one root
    assert_eq!(blogs.len(), 1);
    assert_eq!(titles(&blogs[0]), ["First", "Second"]);

    let blog = blogs[0].read().unwrap();
    let mut counts: Vec<(String, usize)> = blog
        .posts
        .iter()
        .map(|p| {
            let p = p.read().unwrap();
            (p.title.clone(), p.comments.len())
        })
        .collect();
    counts.sort();
    assert_eq!(
        counts,
        [("First".to_string(), 2), ("Second".to_string(), 1)]
    );
    assert_eq!(
        blog.author.as_ref().map(|a| a.read().unwrap().name.clone()),
        Some("Ada".to_string())
    );
}

#[test]
fn test_shared_parent_is_one_instance() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    blog(&db, "Notes", ada.id);
    blog(&db, "News", ada.id);

    let blogs = db.fetch_graph(&blog_plan(&db), None).into_result().unwrap();
    assert_eq!(blogs.len(), 2);
    let first = blogs[0].read().unwrap().author.clone().unwrap();
    let second = blogs[1].read().unwrap().author.clone().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_roots_keep_first_seen_order() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    let a = blog(&db, "A", ada.id);
    let b = blog(&db, "B", ada.id);
    let c = blog(&db, "C", ada.id);
    post(&db, c.id, "c1");
    post(&db, a.id, "a1");
    post(&db, a.id, "a2");

    let blogs = db.fetch_graph(&blog_plan(&db), None).into_result().unwrap();
    let ids: Vec<i64> = blogs.iter().map(|b| b.read().unwrap().id).collect();
    assert_eq!(ids, [a.id, b.id, c.id]);
    // Root without children still loads
    assert!(blogs[1].read().unwrap().posts.is_empty());
}

#[test]
fn test_soft_deleted_children_are_excluded() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    let notes = blog(&db, "Notes", ada.id);
    let kept = post(&db, notes.id, "Kept");
    let dropped = post(&db, notes.id, "Dropped");
    comment(&db, dropped.id, "gone with its post");
    comment(&db, kept.id, "stays");
    db.delete(&dropped).into_result().unwrap();

    let blogs = db.fetch_graph(&blog_plan(&db), None).into_result().unwrap();
    assert_eq!(titles(&blogs[0]), ["Kept"]);
    let blog = blogs[0].read().unwrap();
    let kept = blog.posts[0].read().unwrap();
    assert_eq!(kept.comments.len(), 1);
    assert_eq!(kept.comments[0].read().unwrap().body, "stays");
}

#[test]
fn test_soft_deleted_single_navigation_is_none() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    blog(&db, "Notes", ada.id);
    db.delete(&ada).into_result().unwrap();

    let blogs = db.fetch_graph(&blog_plan(&db), None).into_result().unwrap();
    assert_eq!(blogs.len(), 1);
    assert!(blogs[0].read().unwrap().author.is_none());
}

#[test]
fn test_root_filter() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    let notes = blog(&db, "Notes", ada.id);
    let news = blog(&db, "News", ada.id);
    post(&db, notes.id, "n1");
    post(&db, news.id, "x1");

    let filter = Col::<Blog>::new("Title").eq("News");
    let blogs = db
        .fetch_graph(&blog_plan(&db), Some(&filter))
        .into_result()
        .unwrap();
    assert_eq!(blogs.len(), 1);
    assert_eq!(blogs[0].read().unwrap().id, news.id);
    assert_eq!(titles(&blogs[0]), ["x1"]);
}

#[test]
fn test_soft_deleted_roots_are_excluded() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let ada = author(&db, "Ada");
    author(&db, "Bob");
    db.delete(&ada).into_result().unwrap();

    let plan = db.include::<Author>().unwrap();
    let authors = db.fetch_graph(&plan, None).into_result().unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].read().unwrap().name, "Bob");
}

#[test]
fn test_include_without_relationship_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db = context(&dir);
    let result = db
        .include::<Author>()
        .unwrap()
        .include_many::<Comment, _>("Comments", |_, _| {});
    assert!(matches!(result, Err(Error::Config(_))));
}
