use megaera::{Handler, HandlerError, Page, PageResult, ResponseState};

pub fn page(base: &str) -> Page {
    Page::with_base(file!(), base).get(get)
}

/// `?name=` 选择演示分支：`notfound` → 404，`needindex` → 503，`error` → 500。
/// `?count=` 不是整数时，解析错误经由 `?` 成为 500。
fn get(handler: &mut Handler<'_>, response: &mut ResponseState) -> PageResult {
    let name = handler.param("name").unwrap_or("").to_string();
    match name.as_str() {
        "notfound" => return handler.not_found(),
        "needindex" => return Err(HandlerError::NeedIndex),
        "error" => return Err(HandlerError::failure("Exception", "generic error")),
        _ => {}
    }
    if let Some(count) = handler.param("count") {
        let count: i64 = count.parse()?;
        response.insert("count", count);
    }
    response.insert("messages.hello", format!("hello {}", name));
    Ok(None)
}
