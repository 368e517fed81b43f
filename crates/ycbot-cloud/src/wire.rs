//! JSON shapes of the cloud REST API (minimal subset).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ycbot_types::Organization;

/// Body of the token exchange request.
#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    #[serde(rename = "yandexPassportOauthToken")]
    pub oauth_token: &'a str,
}

/// Body of a successful token exchange.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(rename = "iamToken")]
    pub iam_token: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// An instance as listed by the compute API, labels unvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// One page of a list response.
pub trait Page: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

macro_rules! list_page {
    ($name:ident, $field:ident, $item:ty) => {
        #[derive(Debug, Deserialize)]
        pub struct $name {
            #[serde(default)]
            pub $field: Vec<$item>,
            #[serde(default, rename = "nextPageToken")]
            pub next_page_token: Option<String>,
        }

        impl Page for $name {
            type Item = $item;

            fn into_parts(self) -> (Vec<$item>, Option<String>) {
                (self.$field, self.next_page_token)
            }
        }
    };
}

list_page!(OrganizationsPage, organizations, Organization);
list_page!(CloudsPage, clouds, CloudRecord);
list_page!(FoldersPage, folders, FolderRecord);
list_page!(InstancesPage, instances, InstanceRecord);
