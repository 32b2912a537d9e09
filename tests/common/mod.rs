#![allow(dead_code)]

pub mod test_server {
    use sitekit::server::{HttpServer, Server, ServerHandle};
    use std::net::SocketAddr;
    use std::sync::{Arc, Once};

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// A server bound to an ephemeral port, stopped on drop.
    pub struct TestServer {
        handle: Option<ServerHandle>,
        pub addr: SocketAddr,
    }

    impl TestServer {
        pub fn start(server: Server) -> Self {
            setup_may_runtime();
            let handle = HttpServer(Arc::new(server)).start("127.0.0.1:0").unwrap();
            handle.wait_ready().unwrap();
            let addr = handle.addr();
            Self {
                handle: Some(handle),
                addr,
            }
        }

        pub fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }
}

pub mod requests {
    use http::Method;
    use sitekit::server::{Request, RequestBuilder};

    pub fn request(method: Method, target: &str) -> RequestBuilder {
        Request::builder(method, target)
    }

    pub fn get(target: &str) -> Request {
        Request::builder(Method::GET, target).build().unwrap()
    }

    /// A GET that appears to come from a remote client.
    pub fn get_from(target: &str, ip: &str) -> Request {
        Request::builder(Method::GET, target)
            .header("x-forwarded-for", ip)
            .build()
            .unwrap()
    }
}

pub mod fixtures {
    use std::path::Path;

    /// `0123456789` repeated to `len` bytes.
    pub fn digits(len: usize) -> Vec<u8> {
        (0..len).map(|i| b'0' + (i % 10) as u8).collect()
    }

    pub fn write(dir: &Path, rel: &str, data: impl AsRef<[u8]>) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, data).unwrap();
    }
}
