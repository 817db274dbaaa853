use std::sync::Mutex;

use lazy_static::lazy_static;
use log::warn;
use megaera::{fields, Handler, Page, PageResult, ResponseState, Value};

/// 缓存的留言列表保留一分钟
const CACHE_TTL: u64 = 60;
const MAX_LENGTH: usize = 140;
const LANGUAGES: [&str; 3] = ["en", "fr", "de"];

lazy_static! {
    static ref GREETINGS: Mutex<Vec<String>> = Mutex::new(Vec::new());
}

pub fn page(base: &str) -> Page {
    Page::with_base(file!(), base).get(get).post(post)
}

fn greetings() -> std::sync::MutexGuard<'static, Vec<String>> {
    match GREETINGS.lock() {
        Ok(lock) => lock,
        Err(poisoned) => {
            warn!("留言列表的锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

fn language(handler: &Handler<'_>) -> &'static str {
    let requested = handler.param("lang").unwrap_or("en");
    LANGUAGES
        .iter()
        .find(|lang| **lang == requested)
        .copied()
        .unwrap_or("en")
}

fn title(lang: &str) -> &'static str {
    match lang {
        "fr" => "Messages",
        "de" => "Grüße",
        _ => "Greetings",
    }
}

fn get(handler: &mut Handler<'_>, response: &mut ResponseState) -> PageResult {
    let lang = language(handler);
    if !handler.cached(response, Some(lang)) {
        let list = greetings().clone();
        handler.cache(
            response,
            CACHE_TTL,
            Some(lang),
            fields([
                ("title", Value::from(title(lang))),
                ("greetings", Value::from(list)),
            ]),
        );
    }
    response.insert("lang", lang);
    Ok(None)
}

fn post(handler: &mut Handler<'_>, response: &mut ResponseState) -> PageResult {
    let message = handler.param("message").unwrap_or("").trim().to_string();
    if message.is_empty() {
        response.form_error("message", "Please enter a message.");
        return Ok(None);
    }
    if message.chars().count() > MAX_LENGTH {
        response.form_error("message", format!("Keep it under {} characters.", MAX_LENGTH));
        response.insert("message", message);
        return Ok(None);
    }
    greetings().push(message.clone());
    for lang in LANGUAGES {
        handler.invalidate(None, Some(lang));
    }
    response.insert("posted", message);
    handler.redirect("/greetings");
    Ok(None)
}
