use once_cell::sync::Lazy;

use crate::database::entity::{ColumnDef, ColumnKind, EntityMeta, CREATED_FROM};
use crate::schema::{Field, ModelSchema};

/// Ways a user can prove their identity. Only `EMAIL` is issued today.
pub const AUTH_TYPES: &[&str] = &["EMAIL", "PHONE", "TWITTER", "FACEBOOK"];

/// A registered person. Usernames are unique but optional at the storage
/// level; registration requires one.
pub static USER: Lazy<EntityMeta> = Lazy::new(|| {
    EntityMeta::new("user")
        .column(ColumnDef::new("username", ColumnKind::Varchar(30)).unique())
        .column(ColumnDef::new("created_at", ColumnKind::Timestamp).not_null().default_now())
        .column(ColumnDef::new(CREATED_FROM, ColumnKind::Inet).not_null())
});

/// One authentication mechanism of a user. `token` holds the credential
/// digest for `EMAIL`.
pub static USER_AUTH: Lazy<EntityMeta> = Lazy::new(|| {
    EntityMeta::new("user_auth")
        .column(ColumnDef::new("auth_type", ColumnKind::Varchar(20)).not_null().default_text("EMAIL"))
        .column(ColumnDef::new("token", ColumnKind::Varchar(250)).not_null())
        .column(ColumnDef::new("meta", ColumnKind::Varchar(250)))
        .with_audit(|| &*USER)
});

pub static USER_SCHEMA: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new(vec![
        Field::integer("id").dump_only(),
        Field::string("username").max_length(30).required(),
        Field::datetime("created_at").dump_only(),
    ])
});

pub static USER_AUTH_SCHEMA: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new(vec![
        Field::integer("id").dump_only(),
        Field::choice("auth_type", AUTH_TYPES),
        Field::string("token").max_length(250).required().load_only(),
        Field::string("meta").max_length(250).allow_none(),
        Field::nested("created_by", || &*USER_SCHEMA).required(),
        Field::datetime("created_at").dump_only(),
    ])
});

/// Login payload; never stored.
pub static LOGIN_SCHEMA: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new(vec![
        Field::string("username").required(),
        Field::string("password").required().load_only(),
    ])
});
