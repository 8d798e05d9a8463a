use rttp_dispatch::config::NavigationMode;
use rttp_dispatch::events::RedirectEvent;
use rttp_dispatch::session::{MemorySession, SessionStore};
use rttp_dispatch::transport::BufferTransport;
use rttp_dispatch::{App, KernelConfig, Method, Params, Redirection, Reply, Request};
use serde_json::json;

fn app(config: KernelConfig) -> App {
    let mut app = App::new(config);
    app.route_fn("GET @home /", |_ctx| Ok(Reply::from("home"))).unwrap();
    app.route_fn("GET @order /order/@id", |ctx| {
        let id = ctx.require("id")?.to_owned();
        Ok(Reply::from(format!("order {id}")))
    })
    .unwrap();
    app.route_fn("POST /checkout", |_ctx| {
        Err(Redirection::route("order", Params::from([("id", "42")])).into())
    })
    .unwrap();
    app.route_fn("POST /cancel", |_ctx| Err(Redirection::back(Some("/fallback".into())).into()))
        .unwrap();
    app
}

fn send(app: &App, request: Request) -> BufferTransport {
    let mut transport = BufferTransport::new();
    app.handle(request, &mut transport).unwrap();
    transport
}

#[test]
fn redirect_to_route_uses_an_absolute_url() {
    let app = app(KernelConfig::default());
    let request = Request::new(Method::Post, "/checkout").with_header("Host", "shop.test");
    let transport = send(&app, request);

    assert_eq!(transport.code(), Some(302));
    assert_eq!(transport.header("location"), Some("http://shop.test/order/42"));
    assert_eq!(transport.header("content-length"), Some("0"));
}

#[test]
fn redirect_back_prefers_the_referer() {
    let app = app(KernelConfig::default());
    let request = Request::new(Method::Post, "/cancel").with_header("Referer", "/order/7");
    let transport = send(&app, request);

    assert_eq!(transport.code(), Some(303));
    assert_eq!(transport.header("location"), Some("/order/7"));

    let transport = send(&app, Request::new(Method::Post, "/cancel"));
    assert_eq!(transport.header("location"), Some("/fallback"));
}

#[test]
fn redirect_listener_rewrites_the_target() {
    let mut app = app(KernelConfig::default());
    app.listen(0, |event: &mut RedirectEvent| {
        event.url = event.url.replace("http://", "https://");
        event.code = 307;
        Ok(())
    });

    let transport = send(&app, Request::new(Method::Post, "/checkout"));
    assert_eq!(transport.code(), Some(307));
    assert_eq!(transport.header("location"), Some("https://localhost/order/42"));
}

#[test]
fn stopping_the_redirect_event_drops_location() {
    let mut app = app(KernelConfig::default());
    app.listen(0, |event: &mut RedirectEvent| {
        event.set_output("not today");
        Ok(())
    });

    let transport = send(&app, Request::new(Method::Post, "/checkout"));
    assert_eq!(transport.code(), Some(302));
    assert!(transport.header("location").is_none());
    assert_eq!(transport.body_str(), "not today");
}

#[test]
fn cookie_navigation_remembers_the_page_for_next_time() {
    let mut config = KernelConfig::default();
    config.navigation.mode = NavigationMode::Cookie;
    let app = app(config);

    let transport = send(&app, Request::new(Method::Get, "/order/5?tab=items"));
    let cookie = transport.header("set-cookie").unwrap();
    assert!(cookie.starts_with("referer=http%3A%2F%2Flocalhost%2Forder%2F5%3Ftab%3Ditems;"));

    let request = Request::new(Method::Post, "/cancel").with_header("Cookie", "referer=%2Forder%2F5");
    let transport = send(&app, request);
    assert_eq!(transport.header("location"), Some("/order/5"));
}

#[test]
fn session_navigation_uses_the_store() {
    let mut config = KernelConfig::default();
    config.navigation.mode = NavigationMode::Session;
    let app = app(config);
    let store = MemorySession::new();

    let mut transport = BufferTransport::new();
    let mut kernel = app
        .kernel(Request::new(Method::Get, "/order/9"), &mut transport)
        .with_session(&store);
    kernel.run().unwrap();
    drop(kernel);
    assert_eq!(store.get("referer"), Some(json!("http://localhost/order/9")));

    let mut transport = BufferTransport::new();
    let mut kernel = app
        .kernel(Request::new(Method::Post, "/cancel"), &mut transport)
        .with_session(&store);
    kernel.run().unwrap();
    drop(kernel);
    assert_eq!(transport.header("location"), Some("http://localhost/order/9"));
}
