use serde_json::Value;
use tracing::info;

use super::models::QUESTION;
use crate::database::record::Record;
use crate::database::storage::{Storage, StorageError, StorageSession};

/// `(text, password_text, data_type)` of the stock questions without a parent.
const STANDALONE: &[(&str, &str, &str)] = &[
    ("Your date of birth", "What is your date of birth?", "string"),
    ("Place of birth", "What is your place of birth?", "string"),
    ("Your secret superhero", "Name of your secret superhero?", "string"),
];

const MARITAL: (&str, &str, &str) = ("If you are/had been married", "Marital details", "category");

const MARITAL_DETAILS: &[(&str, &str, &str)] = &[
    ("Name of your spose", "First name of your spouse?", "string"),
    ("Date of marriage", "Date of your marriage?", "date"),
    ("Place of marriage", "Where did you get married?", "string"),
];

const TRAILING: &[(&str, &str, &str)] = &[
    ("Secret superpower", "What is your secret superpower?", "string"),
    ("Favorite villain/hero", "Who is your favorite villain/hero?", "string"),
];

/// Insert the stock security questions in one transaction.
pub async fn load_fixtures(storage: &dyn Storage) -> Result<usize, StorageError> {
    let mut session = storage.begin().await?;
    match insert_questions(session.as_mut()).await {
        Ok(count) => {
            session.commit().await?;
            info!("Loaded {} fixture questions", count);
            Ok(count)
        }
        Err(err) => {
            session.rollback().await?;
            Err(err)
        }
    }
}

async fn insert_questions(session: &mut dyn StorageSession) -> Result<usize, StorageError> {
    let mut count = 0;
    for &question in STANDALONE {
        insert(session, question, None).await?;
        count += 1;
    }

    let parent = insert(session, MARITAL, None).await?;
    count += 1;
    for &question in MARITAL_DETAILS {
        insert(session, question, parent.clone()).await?;
        count += 1;
    }

    for &question in TRAILING {
        insert(session, question, None).await?;
        count += 1;
    }
    Ok(count)
}

/// Returns the new row's id.
async fn insert(
    session: &mut dyn StorageSession,
    (text, password_text, data_type): (&str, &str, &str),
    related_id: Option<Value>,
) -> Result<Option<Value>, StorageError> {
    let mut record = Record::new();
    record
        .set("text", text)
        .set("password_text", password_text)
        .set("data_type", data_type)
        .set("related_id", related_id.unwrap_or(Value::Null));
    session.persist(&QUESTION, &mut record, false).await?;
    session.flush().await?;
    Ok(record.get("id").cloned())
}
