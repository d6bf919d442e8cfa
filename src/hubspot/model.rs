use serde::Deserialize;

use crate::model::{Page, PageType};

/// Page object as returned by the CMS pages API.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HubSpotPage {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub html_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub current_state: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl HubSpotPage {
    pub fn into_page(self, page_type: PageType) -> Page {
        Page {
            id: self.id,
            page_type,
            name: self.name,
            slug: self.slug,
            url: self.url,
            html_title: self.html_title,
            meta_description: self.meta_description,
            state: self.current_state.or(self.state),
            body: self.body,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct PageCollection {
    pub results: Vec<HubSpotPage>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Deserialize, Debug)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<NextPage>,
}

#[derive(Deserialize, Debug)]
pub struct NextPage {
    pub after: String,
}
