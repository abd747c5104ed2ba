use serde::{Deserialize, Serialize};


/// One unit of consumption: the record created together with a one-credit
/// debit. Immutable after creation; removed only by cascading account
/// deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creation {
    pub id: String,
    /// Owning account. Backward reference only - accounts never point at
    /// their creations.
    pub account_id: String,
    /// The request payload that was consumed (the generation prompt).
    pub prompt: String,
    pub created_at: i64,
}
