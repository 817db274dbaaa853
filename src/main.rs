// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 演示服务器
//!
//! 基于 Tokio 运行时的多线程服务器，把两个演示页面挂到分发层上：
//! - `/`：默认页面，`?name=notfound|needindex|error` 可以触发各类错误分支；
//! - `/greetings`：留言表单，演示 POST 校验、按语言分片的缓存与缓存失效。
//!
//! 任何路径都可以追加 `.json`、`.yaml`、`.xml`、`.atom` 后缀或同名查询参数来切换表示。

mod handlers;

use megaera::{
    app::App,
    cache::MemoryStore,
    config::Config,
    exception::Exception,
    handler::{dispatch, not_found},
    param::HttpRequestMethod,
    request::Request,
    response::Response,
    router::Router,
    template::FileTemplates,
    users::DevUsers,
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    runtime::Builder,
};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    process,
    sync::Arc,
    time::Instant,
};

/// 单次读取的字节数
const BUFFER_SIZE: usize = 16 * 1024;
/// 一个请求（报文头加正文）的长度上限
const MAX_REQUEST_SIZE: usize = 1024 * 1024;
const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

fn main() {
    // 1. 初始化日志系统：通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
        process::exit(1);
    }

    // 2. 载入配置
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => config,
        Err(e) => {
            error!("无法载入配置：{}", e);
            process::exit(1);
        }
    };
    info!("配置文件已载入，环境：{}", config.environment().name());

    // 3. 根据配置分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法构建异步运行时：{}", e);
            process::exit(1);
        }
    };

    // 4. 共享资源：渲染上下文与路由表在进程启动时构造一次
    let mut templates = FileTemplates::new(config.templates_root());
    handlers::install_filters(&mut templates);
    let store = MemoryStore::from_capacity(config.cache_size());
    let users = DevUsers::new(config.admin());
    let port = config.port();
    let local = config.local();
    let app = Arc::new(App::new(
        config,
        Box::new(templates),
        Arc::new(store),
        Box::new(users),
    ));
    let router = match handlers::router(app.config().handlers_base()) {
        Ok(router) => Arc::new(router),
        Err(e) => {
            error!("无法构建路由表：{}", e);
            process::exit(1);
        }
    };
    info!("已注册{}条路由", router.len());

    runtime.block_on(serve(app, router, port, local));
}

async fn serve(app: Arc<App>, router: Arc<Router>, port: u16, local: bool) {
    // 支持全地址监听 (0.0.0.0) 或本地回环监听 (127.0.0.1)
    let address = match local {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddrV4::new(address, port);
    let listener = match TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            return;
        }
    };
    info!("服务端在{}上监听", socket);

    let mut id: u128 = 0;
    loop {
        let (mut stream, addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("接受连接失败：{}", e);
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("收到停机信号，正在退出...");
                break;
            }
        };
        debug!("[ID{}]新的连接：{}", id, addr);

        let app = Arc::clone(&app);
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            handle_connection(&mut stream, id, &app, &router).await;
        });
        id += 1;
    }
}

/// 读取完整的请求报文：先读到报文头结束，再按 `Content-Length` 读完正文。
///
/// 连接在读到任何字节前关闭，或读写出错时返回 `None`。
async fn read_request(stream: &mut TcpStream, id: u128) -> Option<Result<Vec<u8>, Exception>> {
    let mut buffer = Vec::with_capacity(BUFFER_SIZE);
    let mut chunk = vec![0; BUFFER_SIZE];
    let mut continued = false;
    loop {
        match Request::expected_length(&buffer) {
            Some(total) if total > MAX_REQUEST_SIZE => {
                warn!("[ID{}]请求长度{}超出上限{}", id, total, MAX_REQUEST_SIZE);
                return Some(Err(Exception::RequestTooLarge));
            }
            Some(total) if buffer.len() >= total => {
                buffer.truncate(total);
                return Some(Ok(buffer));
            }
            Some(_) if !continued && Request::expects_continue(&buffer) => {
                debug!("[ID{}]客户端等待100 Continue", id);
                continued = true;
                if let Err(e) = stream.write_all(CONTINUE).await {
                    error!("[ID{}]发送100 Continue失败: {}", id, e);
                    return None;
                }
            }
            Some(_) => {}
            None if buffer.len() > MAX_REQUEST_SIZE => {
                warn!("[ID{}]报文头超出上限{}", id, MAX_REQUEST_SIZE);
                return Some(Err(Exception::RequestTooLarge));
            }
            None => {}
        }
        let n = match stream.read(&mut chunk).await {
            Ok(0) if buffer.is_empty() => return None,
            Ok(0) => {
                debug!("[ID{}]连接在请求读完之前关闭", id);
                return Some(Ok(buffer));
            }
            Ok(n) => n,
            Err(e) => {
                error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
                return None;
            }
        };
        buffer.extend_from_slice(&chunk[..n]);
    }
}

/// 读取并解析请求，交给分发层，写回响应。
async fn handle_connection(stream: &mut TcpStream, id: u128, app: &App, router: &Router) {
    let buffer = match read_request(stream, id).await {
        Some(Ok(buffer)) => buffer,
        Some(Err(e)) => {
            let _ = stream.write_all(&Response::bad_request(&e.to_string()).as_bytes()).await;
            return;
        }
        None => return,
    };
    let start_time = Instant::now();

    let response = match Request::try_from(&buffer, id) {
        Ok(request) => {
            let response = respond(&request, id, app, router);
            info!(
                "[ID{}] {}, {}, {}, {}, {}, {}",
                id,
                request.version(),
                request.uri(),
                request.method(),
                response.status_code(),
                response.information(),
                request.user_agent(),
            );
            response
        }
        Err(e) => {
            error!("[ID{}]解析HTTP请求失败: {}", id, e);
            Response::bad_request(&e.to_string())
        }
    };
    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    if let Err(e) = stream.write_all(&response.as_bytes()).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
}

fn respond(request: &Request, id: u128, app: &App, router: &Router) -> Response {
    if request.method() == HttpRequestMethod::Options {
        debug!("[ID{}]请求方法为OPTIONS", id);
        return Response::options();
    }
    let reply = match router.route(request.path()) {
        Some(route) => dispatch(app, &route, request, id),
        None => not_found(app, request, id),
    };
    Response::from_reply(&reply, request, id)
}
