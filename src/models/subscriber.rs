use serde::{ Serialize, Deserialize };

/// One row of the subscribers table. `keywords` is stored as a JSON array in a
/// TEXT column and decoded on read; the REST API returns it as a real array.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: i64,
    pub phone: String,
    pub keywords: Vec<String>,
    pub created_at: i64,
}
