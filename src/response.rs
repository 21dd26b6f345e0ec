use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

use crate::errors::FieldErrors;

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;
/// Keeps every offset representable as a BSON `i64` skip.
const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PER_PAGE;

/// The `{status, data, message, errors}` wrapper every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: FieldErrors,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Envelope { status: true, data: Some(data), message: None, errors: FieldErrors::new() }
    }

    pub fn error(message: impl Into<String>, errors: FieldErrors) -> Self {
        Envelope { status: false, data: None, message: Some(message.into()), errors }
    }
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::success(data))
}

pub fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope::success(data))
}

fn notice(text: &str) -> Envelope<()> {
    Envelope { status: true, data: None, message: Some(text.to_string()), errors: FieldErrors::new() }
}

/// A short confirmation such as "Email verified", carried in `message`.
pub fn message(text: &str) -> HttpResponse {
    HttpResponse::Ok().json(notice(text))
}

pub fn created_message(text: &str) -> HttpResponse {
    HttpResponse::Created().json(notice(text))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        PageRequest {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(None, None)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub has_more_pages: bool,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        let has_more_pages = request.offset().saturating_add(data.len() as u64) < total;
        Page {
            data,
            current_page: request.page,
            per_page: request.per_page,
            total,
            has_more_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            current_page: self.current_page,
            per_page: self.per_page,
            total: self.total,
            has_more_pages: self.has_more_pages,
        }
    }
}

/// Query string shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub search: Option<String>,
    pub category: Option<i64>,
    pub status: Option<crate::models::ProductStatus>,
}

impl ListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}
