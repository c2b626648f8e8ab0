//! Entities shared by the unit tests of this crate.

use sqlentity_core::{
    ColumnType, DescriptorBuilder, Entity, EntityRef, EntityRegistry, FieldSpec, FromValue,
    Record, Result, Value,
};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub nickname: Option<String>,
    pub retired: bool,
    pub score: f64,
}

impl Record for Person {
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Id", ColumnType::Integer),
            FieldSpec::new("Name", ColumnType::Text),
            FieldSpec::new("Age", ColumnType::Integer),
            FieldSpec::new("Nickname", ColumnType::Text).nullable(),
            FieldSpec::new("Retired", ColumnType::Boolean),
            FieldSpec::new("Score", ColumnType::Real),
        ];
        FIELDS
    }

    fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.name = FromValue::from_value(value)?,
            2 => self.age = FromValue::from_value(value)?,
            3 => self.nickname = FromValue::from_value(value)?,
            4 => self.retired = FromValue::from_value(value)?,
            5 => self.score = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Person {
    const TABLE: &'static str = "Person";

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
            Value::Int(self.age),
            self.nickname.clone().into(),
            Value::Bool(self.retired),
            Value::Double(self.score),
        ]
    }
}

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
        builder.soft_delete().foreign_key("AuthorId", "Author")
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
        builder.foreign_key("BlogId", "Blog")
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
        builder.soft_delete().foreign_key("PostId", "Post")
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

/// Join destination shape.
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

pub fn registry() -> Arc<EntityRegistry> {
    Arc::new(
        EntityRegistry::builder()
            .register::<Person>()
            .register::<Author>()
            .register::<Blog>()
            .register::<Post>()
            .register::<Comment>()
            .build()
            .unwrap(),
    )
}
