use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use megaera::negotiate::negotiate;
use megaera::to_xml::DEFAULT_INDENT;
use megaera::{sanitize, to_xml, HttpRequestMethod, Request, ResponseState, Value};

fn request_parse_different_methods_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_methods");

    let requests = [
        ("GET", b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n".as_slice()),
        ("HEAD", b"HEAD / HTTP/1.1\r\nHost: localhost\r\n\r\n".as_slice()),
        (
            "POST",
            b"POST /greetings HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\nmessage=hello+there".as_slice(),
        ),
        ("OPTIONS", b"OPTIONS * HTTP/1.1\r\nHost: localhost\r\n\r\n".as_slice()),
    ];

    for (method, request) in requests.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(method), request, |b, request| {
            b.iter(|| {
                let buffer = black_box(request.to_vec());
                let _ = Request::try_from(&buffer, 0);
            });
        });
    }

    group.finish();
}

fn request_parse_query_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_query");

    let uris = [
        ("short", "/"),
        ("suffix", "/blog/post/first-post.json"),
        ("query", "/search?q=rust+web&page=2&lang=fr&callback=handleData&json"),
    ];

    for (name, uri) in uris.iter() {
        let raw = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nAccept: application/json\r\n\r\n", uri);
        group.bench_with_input(BenchmarkId::from_parameter(name), &raw, |b, raw| {
            b.iter(|| {
                let _ = Request::try_from(black_box(raw.as_bytes()), 0);
            });
        });
    }

    group.finish();
}

fn negotiate_benchmark(c: &mut Criterion) {
    let by_query = Request::blank(HttpRequestMethod::Get, "/?yaml");
    let by_accept = Request::blank(HttpRequestMethod::Get, "/")
        .with_header("Accept", "image/png, text/plain;q=0.5, application/xml");
    let fallback = Request::blank(HttpRequestMethod::Get, "/");

    c.bench_function("negotiate_query", |b| b.iter(|| negotiate(black_box(&by_query), None)));
    c.bench_function("negotiate_suffix", |b| {
        b.iter(|| negotiate(black_box(&fallback), black_box(Some("json"))))
    });
    c.bench_function("negotiate_accept", |b| b.iter(|| negotiate(black_box(&by_accept), None)));
}

fn response_state(entries: usize) -> Value {
    let mut state = ResponseState::new();
    for i in 0..entries {
        state.insert(&format!("posts.post{}.title", i), format!("Post {}", i));
        state.insert(&format!("posts.post{}.views", i), i);
        state.insert(&format!("posts.post{}.tags", i), vec!["rust", "web"]);
    }
    state.insert("status", 200u16);
    state.to_value()
}

fn encode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let urlize = |path: &str| format!("http://localhost{}", path);

    for size in [10, 100, 1000].iter() {
        let value = response_state(*size);
        group.bench_with_input(BenchmarkId::new("sanitize", size), &value, |b, value| {
            b.iter(|| sanitize(black_box(value), &urlize));
        });
        let sanitized = sanitize(&value, &urlize);
        group.bench_with_input(BenchmarkId::new("json", size), &sanitized, |b, sanitized| {
            b.iter(|| serde_json::to_string(black_box(sanitized)));
        });
        group.bench_with_input(BenchmarkId::new("xml", size), &sanitized, |b, sanitized| {
            b.iter(|| to_xml(black_box(sanitized), "response", DEFAULT_INDENT));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    request_parse_different_methods_benchmark,
    request_parse_query_benchmark,
    negotiate_benchmark,
    encode_benchmark
);
criterion_main!(benches);
