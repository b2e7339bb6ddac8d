use crate::database::entity::EntityMeta;
use crate::database::postgres::quote;

/// `CREATE TABLE` for one entity. Foreign keys are inline column references,
/// so tables must be created in dependency order.
pub fn create_table(entity: &EntityMeta) -> String {
    let mut lines = Vec::new();
    for column in &entity.columns {
        let mut line = format!("    {} {}", quote(column.name), column.kind.ddl_type());
        if column.name == entity.primary_key {
            line.push_str(" PRIMARY KEY");
        } else {
            if !column.nullable {
                line.push_str(" NOT NULL");
            }
            if column.unique {
                line.push_str(" UNIQUE");
            }
            if let Some(default) = &column.default {
                line.push_str(&format!(" DEFAULT {}", default.ddl()));
            }
        }
        if let Some(fk) = entity.foreign_keys.iter().find(|fk| fk.column == column.name) {
            line.push_str(&format!(
                " REFERENCES {} ({})",
                quote(fk.target().name),
                quote(fk.target_column)
            ));
        }
        lines.push(line);
    }
    format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n)", quote(entity.name), lines.join(",\n"))
}

pub fn drop_table(entity: &EntityMeta) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", quote(entity.name))
}

/// Statements creating every entity, in registration order.
pub fn create_all(entities: &[&'static EntityMeta]) -> Vec<String> {
    entities.iter().map(|e| create_table(e)).collect()
}

/// Statements dropping every entity, dependents first.
pub fn drop_all(entities: &[&'static EntityMeta]) -> Vec<String> {
    entities.iter().rev().map(|e| drop_table(e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::entity::{ColumnDef, ColumnKind};
    use once_cell::sync::Lazy;

    static PERSON: Lazy<EntityMeta> = Lazy::new(|| {
        EntityMeta::new("user").column(ColumnDef::new("username", ColumnKind::Varchar(40)).unique())
    });

    static ENTRY: Lazy<EntityMeta> = Lazy::new(|| {
        EntityMeta::new("entry")
            .column(ColumnDef::new("kind", ColumnKind::Text).not_null().default_text("EMAIL"))
            .with_audit(|| &*PERSON)
    });

    #[test]
    fn renders_columns_constraints_and_references() {
        let sql = create_table(&ENTRY);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"entry\" ("));
        assert!(sql.contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(sql.contains("\"kind\" TEXT NOT NULL DEFAULT 'EMAIL'"));
        assert!(sql.contains("\"created_at\" TIMESTAMPTZ DEFAULT now()"));
        assert!(sql.contains("\"created_from\" INET NOT NULL"));
        assert!(sql.contains("\"created_by_id\" INTEGER NOT NULL REFERENCES \"user\" (\"id\")"));
        assert!(create_table(&PERSON).contains("\"username\" VARCHAR(40) UNIQUE"));
    }

    #[test]
    fn drops_in_reverse_order() {
        let statements = drop_all(&[&*PERSON, &*ENTRY]);
        assert_eq!(statements[0], "DROP TABLE IF EXISTS \"entry\" CASCADE");
        assert_eq!(statements[1], "DROP TABLE IF EXISTS \"user\" CASCADE");
    }
}
