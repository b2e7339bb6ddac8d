use once_cell::sync::Lazy;

use crate::apps::account::USER;
use crate::database::entity::{ColumnDef, ColumnKind, EntityMeta};
use crate::schema::{Field, ModelSchema};

pub const DATA_TYPES: &[&str] = &["category", "string", "date", "place"];

/// A personal question a user answers to unlock or generate a password.
/// A question may hang under a parent, e.g. "Date of marriage" under the
/// marital category.
pub static QUESTION: Lazy<EntityMeta> = Lazy::new(|| {
    EntityMeta::new("question")
        .column(ColumnDef::new("text", ColumnKind::Varchar(40)).not_null().unique())
        .column(ColumnDef::new("password_text", ColumnKind::Varchar(40)).not_null())
        .column(ColumnDef::new("data_type", ColumnKind::Varchar(20)).not_null().default_text("string"))
        .column(ColumnDef::new("related_id", ColumnKind::Integer))
        .foreign_key("related_id", || &*QUESTION, "id")
});

pub static PASSWORD: Lazy<EntityMeta> = Lazy::new(|| {
    EntityMeta::new("password")
        .column(ColumnDef::new("name", ColumnKind::Varchar(40)).not_null())
        .with_audit(|| &*USER)
});

/// Questions chosen for one password.
pub static PASSWORD_QUESTION: Lazy<EntityMeta> = Lazy::new(|| {
    EntityMeta::new("password_question")
        .column(ColumnDef::new("password_id", ColumnKind::Integer))
        .column(ColumnDef::new("question_id", ColumnKind::Integer))
        .column(ColumnDef::new("added_at", ColumnKind::Timestamp).not_null().default_now())
        .foreign_key("password_id", || &*PASSWORD, "id")
        .foreign_key("question_id", || &*QUESTION, "id")
});

pub static QUESTION_SCHEMA: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new(vec![
        Field::integer("id").dump_only(),
        Field::string("text").max_length(40).required(),
        Field::string("password_text").max_length(40).required(),
        Field::choice("data_type", DATA_TYPES).required(),
        Field::integer("related_id").allow_none(),
        Field::nested("related", || &*QUESTION_SCHEMA),
    ])
});

pub static PASSWORD_SCHEMA: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new(vec![
        Field::integer("id").dump_only(),
        Field::string("name").max_length(40).required(),
        Field::integer("created_by_id").dump_only(),
        Field::datetime("created_at").dump_only(),
    ])
});

pub static PASSWORD_QUESTION_SCHEMA: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new(vec![
        Field::integer("id").dump_only(),
        Field::integer("password_id").dump_only(),
        Field::integer("question_id"),
        Field::nested("question", || &*QUESTION_SCHEMA),
        Field::datetime("added_at").dump_only(),
    ])
});

/// One answer in a generation request. Answers are never stored.
pub static ANSWER_ITEM_SCHEMA: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new(vec![
        Field::integer("question_id").required(),
        Field::string("answer").required(),
    ])
});

pub static GENERATED_PASSWORD_SCHEMA: Lazy<ModelSchema> =
    Lazy::new(|| ModelSchema::new(vec![Field::string("password").dump_only()]));
