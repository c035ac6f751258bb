use serde::{Deserialize, Serialize};

pub const CUSTOMER: &str = "Customer";
pub const ORDER: &str = "Order";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub customer_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Placed,
}

impl Order {
    /// The empty order every new customer starts with.
    pub fn welcome(customer_id: impl Into<String>) -> Self {
        Self {
            id: None,
            customer_id: customer_id.into(),
            status: OrderStatus::Draft,
        }
    }
}
