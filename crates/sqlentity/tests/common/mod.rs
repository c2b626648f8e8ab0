//! Entities and helpers shared by the SQLite integration tests.

#![allow(dead_code)]

use chrono::NaiveDateTime;
use sqlentity::prelude::*;
use sqlentity::{ChannelSink, Connection, FailureEvent};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

impl Record for Author {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Id", ColumnType::Integer),
            FieldSpec::new("Name", ColumnType::Text),
        ];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.name = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Author {
    const TABLE: &'static str = "Author";

    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder.soft_delete()
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn field_values(&self) -> Vec<Value> {
        vec![Value::Int(self.id), Value::Text(self.name.clone())]
    }
}

#[derive(Debug, Default)]
pub struct Blog {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub posts: Vec<EntityRef<Post>>,
    pub author: Option<EntityRef<Author>>,
}

impl Record for Blog {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Id", ColumnType::Integer),
            FieldSpec::new("Title", ColumnType::Text),
            FieldSpec::new("AuthorId", ColumnType::Integer),
        ];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.title = FromValue::from_value(value)?,
            2 => self.author_id = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Blog {
    const TABLE: &'static str = "Blog";

    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder.foreign_key("AuthorId", "Author").max_length("Title", 200)
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.id),
            Value::Text(self.title.clone()),
            Value::Int(self.author_id),
        ]
    }
}

#[derive(Debug, Default)]
pub struct Post {
    pub id: i64,
    pub blog_id: i64,
    pub title: String,
    pub comments: Vec<EntityRef<Comment>>,
}

impl Record for Post {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Id", ColumnType::Integer),
            FieldSpec::new("BlogId", ColumnType::Integer),
            FieldSpec::new("Title", ColumnType::Text),
        ];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.blog_id = FromValue::from_value(value)?,
            2 => self.title = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Post {
    const TABLE: &'static str = "Post";

    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder.soft_delete().foreign_key("BlogId", "Blog")
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.id),
            Value::Int(self.blog_id),
            Value::Text(self.title.clone()),
        ]
    }
}

#[derive(Debug, Default)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub body: String,
}

impl Record for Comment {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Id", ColumnType::Integer),
            FieldSpec::new("PostId", ColumnType::Integer),
            FieldSpec::new("Body", ColumnType::Text),
        ];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.post_id = FromValue::from_value(value)?,
            2 => self.body = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Comment {
    const TABLE: &'static str = "Comment";

    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder.foreign_key("PostId", "Post")
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.id),
            Value::Int(self.post_id),
            Value::Text(self.body.clone()),
        ]
    }
}

/// Self-referencing entity.
#[derive(Debug, Default)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub manager_id: Option<i64>,
}

impl Record for Employee {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Id", ColumnType::Integer),
            FieldSpec::new("Name", ColumnType::Text),
            FieldSpec::new("ManagerId", ColumnType::Integer).nullable(),
        ];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.name = FromValue::from_value(value)?,
            2 => self.manager_id = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Employee {
    const TABLE: &'static str = "Employee";

    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder.foreign_key("ManagerId", "Employee")
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.id),
            Value::Text(self.name.clone()),
            self.manager_id.into(),
        ]
    }
}

/// Exercises the Guid, DateTime and Boolean conversions.
#[derive(Debug, Default)]
pub struct Event {
    pub id: i64,
    pub token: Uuid,
    pub at: Option<NaiveDateTime>,
    pub note: Option<String>,
    pub done: bool,
}

impl Record for Event {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Id", ColumnType::Integer),
            FieldSpec::new("Token", ColumnType::Guid),
            FieldSpec::new("At", ColumnType::DateTime).nullable(),
            FieldSpec::new("Note", ColumnType::Text).nullable(),
            FieldSpec::new("Done", ColumnType::Boolean),
        ];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.token = FromValue::from_value(value)?,
            2 => self.at = FromValue::from_value(value)?,
            3 => self.note = FromValue::from_value(value)?,
            4 => self.done = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Event {
    const TABLE: &'static str = "Event";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.id),
            Value::Uuid(self.token),
            self.at.into(),
            self.note.clone().into(),
            Value::Bool(self.done),
        ]
    }
}

/// Join destination: blog title with its author's name.
#[derive(Debug, Default)]
pub struct BlogLine {
    pub id: i64,
    pub title: String,
    pub name: String,
}

impl Record for BlogLine {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Id", ColumnType::Integer),
            FieldSpec::new("Title", ColumnType::Text),
            FieldSpec::new("Name", ColumnType::Text),
        ];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.title = FromValue::from_value(value)?,
            2 => self.name = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::builder()
        .register::<Author>()
        .register::<Blog>()
        .register::<Post>()
        .register::<Comment>()
        .register::<Employee>()
        .register::<Event>()
        .build()
        .unwrap()
}

pub fn database_path(dir: &TempDir) -> String {
    dir.path().join("data.db").to_string_lossy().to_string()
}

/// A reconciled context on a fresh file database.
pub fn context(dir: &TempDir) -> DataContext {
    context_with(DataConfig::file(database_path(dir)))
}

pub fn context_with(config: DataConfig) -> DataContext {
    let db = DataContext::new(registry(), config);
    db.reconcile().unwrap();
    db
}

/// Same as [`context`], with failures collected on a channel.
pub fn observed_context(dir: &TempDir) -> (DataContext, Receiver<FailureEvent>) {
    let (sink, events) = ChannelSink::new();
    let db = context(dir).with_sink(Arc::new(sink));
    (db, events)
}

pub fn author(db: &impl DataAccess, name: &str) -> Author {
    let mut author = Author {
        name: name.to_string(),
        ..Author::default()
    };
    db.insert(&mut author).into_result().unwrap();
    author
}

pub fn blog(db: &impl DataAccess, title: &str, author_id: i64) -> Blog {
    let mut blog = Blog {
        title: title.to_string(),
        author_id,
        ..Blog::default()
    };
    db.insert(&mut blog).into_result().unwrap();
    blog
}

pub fn post(db: &impl DataAccess, blog_id: i64, title: &str) -> Post {
    let mut post = Post {
        blog_id,
        title: title.to_string(),
        ..Post::default()
    };
    db.insert(&mut post).into_result().unwrap();
    post
}

pub fn comment(db: &impl DataAccess, post_id: i64, body: &str) -> Comment {
    let mut comment = Comment {
        post_id,
        body: body.to_string(),
        ..Comment::default()
    };
    db.insert(&mut comment).into_result().unwrap();
    comment
}

/// Rows in `table`, bypassing the soft-delete guard.
pub fn raw_count(db: &DataContext, table: &str) -> i64 {
    let conn = db.connect().unwrap();
    conn.query_one(&format!("SELECT COUNT(*) FROM \"{table}\""), &[])
        .unwrap()
        .unwrap()
        .get_as::<i64>(0)
        .unwrap()
}
