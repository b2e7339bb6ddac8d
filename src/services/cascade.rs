use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::debug;

use crate::database::entity::{EntityMeta, CREATED_FROM};
use crate::database::record::Record;
use crate::database::storage::{StorageError, StorageSession};

/// Persist whitelisted related records ahead of their parent.
///
/// Walks the entity's foreign keys in declaration order. For each one whose
/// relation is whitelisted and populated on `record`, the related record's
/// own relations are cascaded first, then it is persisted (insert when it has
/// no primary key, update otherwise) and flushed, and its referenced column is
/// copied into the parent's foreign key. The same whitelist applies at every
/// depth. Nothing is committed; the caller owns the transaction.
pub fn cascade_related<'a>(
    session: &'a mut dyn StorageSession,
    entity: &'static EntityMeta,
    record: &'a mut Record,
    whitelist: &'a [&'static str],
    client_ip: Option<&'a str>,
) -> BoxFuture<'a, Result<(), StorageError>> {
    async move {
        for fk in &entity.foreign_keys {
            let relation = fk.relation();
            if !whitelist.contains(&relation) {
                continue;
            }
            let Some(mut related) = record.take_related(relation) else {
                continue;
            };

            let target = fk.target();
            cascade_related(&mut *session, target, &mut related, whitelist, client_ip).await?;

            if let Some(ip) = client_ip {
                if target.has_column(CREATED_FROM) {
                    related.set(CREATED_FROM, ip);
                }
            }

            session.persist(target, &mut related, false).await?;
            session.flush().await?;

            let key = related.get(fk.target_column).cloned().unwrap_or(Value::Null);
            debug!("Cascaded {}.{} -> {}.{} = {}", entity.name, fk.column, target.name, fk.target_column, key);
            record.set(fk.column, key);
            record.attach_related(relation, related);
        }
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::entity::{ColumnDef, ColumnKind};
    use crate::database::memory::MemoryStorage;
    use crate::database::storage::Storage;
    use once_cell::sync::Lazy;
    use serde_json::json;

    static PERSON: Lazy<EntityMeta> = Lazy::new(|| {
        EntityMeta::new("person")
            .column(ColumnDef::new("name", ColumnKind::Text).not_null().unique())
            .column(ColumnDef::new(CREATED_FROM, ColumnKind::Inet))
    });

    static TOPIC: Lazy<EntityMeta> =
        Lazy::new(|| EntityMeta::new("topic").column(ColumnDef::new("title", ColumnKind::Text).not_null()));

    static POST: Lazy<EntityMeta> = Lazy::new(|| {
        EntityMeta::new("post")
            .column(ColumnDef::new("author_id", ColumnKind::Integer))
            .column(ColumnDef::new("topic_fk", ColumnKind::Integer))
            .foreign_key("author_id", || &*PERSON, "id")
            .foreign_key("topic_fk", || &*TOPIC, "id")
    });

    fn storage() -> MemoryStorage {
        MemoryStorage::new([&*PERSON, &*TOPIC, &*POST])
    }

    fn post_with(author: &str, topic: &str) -> Record {
        let mut person = Record::new();
        person.set("name", author);
        let mut subject = Record::new();
        subject.set("title", topic);
        let mut post = Record::new();
        post.attach_related("author", person).attach_related("topic", subject);
        post
    }

    #[tokio::test]
    async fn persists_related_in_declaration_order_and_links_keys() {
        let storage = storage();
        let mut session = storage.begin().await.unwrap();
        let mut post = post_with("ann", "rust");

        cascade_related(session.as_mut(), &POST, &mut post, &["author", "topic"], Some("10.1.1.1"))
            .await
            .unwrap();
        session.persist(&POST, &mut post, true).await.unwrap();

        let author = post.related("author").unwrap();
        assert_eq!(post.get("author_id"), author.get("id"));
        assert_eq!(post.get_i64("topic_fk"), post.related("topic").unwrap().get_i64("id"));
        assert_eq!(author.get(CREATED_FROM), Some(&json!("10.1.1.1")));
        assert_eq!(storage.rows(&PERSON).await.len(), 1);
        assert_eq!(storage.rows(&POST).await.len(), 1);
    }

    #[tokio::test]
    async fn skips_relations_outside_the_whitelist() {
        let storage = storage();
        let mut session = storage.begin().await.unwrap();
        let mut post = post_with("ann", "rust");

        cascade_related(session.as_mut(), &POST, &mut post, &["topic"], None).await.unwrap();
        assert!(post.get("author_id").is_none());
        assert!(post.get("topic_fk").is_some());
        assert!(post.related("author").is_some());
        session.commit().await.unwrap();
        assert!(storage.rows(&PERSON).await.is_empty());
    }

    #[tokio::test]
    async fn failed_related_write_leaves_nothing_after_rollback() {
        let storage = storage();
        let mut session = storage.begin().await.unwrap();
        let mut first = post_with("ann", "rust");
        cascade_related(session.as_mut(), &POST, &mut first, &["author", "topic"], None).await.unwrap();
        session.persist(&POST, &mut first, true).await.unwrap();

        let mut second = post_with("bob", "go");
        second.related_mut("topic").unwrap().set("title", Value::Null);
        let result = cascade_related(session.as_mut(), &POST, &mut second, &["author", "topic"], None).await;
        assert!(matches!(result, Err(StorageError::Integrity(_))));
        session.rollback().await.unwrap();

        assert_eq!(storage.rows(&PERSON).await.len(), 1);
        assert_eq!(storage.rows(&TOPIC).await.len(), 1);
        assert_eq!(storage.rows(&POST).await.len(), 1);
    }

    #[tokio::test]
    async fn updates_related_records_that_already_exist() {
        let storage = storage();
        let mut session = storage.begin().await.unwrap();
        let mut post = post_with("ann", "rust");
        cascade_related(session.as_mut(), &POST, &mut post, &["author", "topic"], None).await.unwrap();
        session.persist(&POST, &mut post, true).await.unwrap();

        let mut author = post.take_related("author").unwrap();
        author.set("name", "anna");
        post.attach_related("author", author);
        cascade_related(session.as_mut(), &POST, &mut post, &["author"], None).await.unwrap();
        session.commit().await.unwrap();

        let people = storage.rows(&PERSON).await;
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].get("name"), Some(&json!("anna")));
    }

    static NODE: Lazy<EntityMeta> = Lazy::new(|| {
        EntityMeta::new("node")
            .column(ColumnDef::new("label", ColumnKind::Text).not_null())
            .column(ColumnDef::new("parent_id", ColumnKind::Integer))
            .column(ColumnDef::new(CREATED_FROM, ColumnKind::Inet))
            .foreign_key("parent_id", || &*NODE, "id")
    });

    fn node(label: &str) -> Record {
        let mut record = Record::new();
        record.set("label", label);
        record
    }

    #[tokio::test]
    async fn cascades_through_every_level_of_nesting() {
        let storage = MemoryStorage::new([&*NODE]);
        let mut session = storage.begin().await.unwrap();

        let mut parent = node("parent");
        parent.attach_related("parent", node("grandparent"));
        let mut child = node("child");
        child.attach_related("parent", parent);

        cascade_related(session.as_mut(), &NODE, &mut child, &["parent"], Some("10.0.0.2"))
            .await
            .unwrap();
        session.persist(&NODE, &mut child, true).await.unwrap();

        let parent = child.related("parent").unwrap();
        let grandparent = parent.related("parent").unwrap();
        assert!(grandparent.get_i64("id").is_some());
        assert_eq!(parent.get("parent_id"), grandparent.get("id"));
        assert_eq!(child.get("parent_id"), parent.get("id"));

        let rows = storage.rows(&NODE).await;
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.get(CREATED_FROM) == Some(&json!("10.0.0.2"))));
    }

    #[tokio::test]
    async fn restamps_client_address_on_existing_related_rows() {
        let storage = storage();
        let mut session = storage.begin().await.unwrap();
        let mut post = post_with("ann", "rust");
        cascade_related(session.as_mut(), &POST, &mut post, &["author"], Some("10.1.1.1"))
            .await
            .unwrap();
        session.persist(&POST, &mut post, true).await.unwrap();

        cascade_related(session.as_mut(), &POST, &mut post, &["author"], Some("10.9.9.9"))
            .await
            .unwrap();
        session.commit().await.unwrap();
        assert_eq!(storage.rows(&PERSON).await[0].get(CREATED_FROM), Some(&json!("10.9.9.9")));
    }
}
