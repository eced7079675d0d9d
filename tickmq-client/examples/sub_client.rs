#[macro_use]
extern crate log;

use std::io;
use std::net::TcpStream;
use std::process;
use std::time::Duration;

use structopt::StructOpt;

use tickmq_client::{Client, ConnectRequest, Events, Status};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "sub_client",
    about = "an MQTT 3.1.1 client for subscribing to a topic"
)]
struct Opt {
    /// Specify the host to connect to.
    #[structopt(short, long, default_value = "localhost")]
    host: String,

    /// Connect to the port specified.
    #[structopt(short, long, default_value = "1883")]
    port: u16,

    /// The id to use for this client; the process id is appended to the
    /// default prefix otherwise.
    #[structopt(short, long)]
    id: Option<String>,

    /// The number of seconds between PING commands to the broker,
    /// informing it we are still connected and functioning.
    #[structopt(short, long, default_value = "60")]
    keep_alive: u16,

    /// Provide a username to be used for authenticating with the broker.
    #[structopt(short, long)]
    username: Option<String>,

    /// Provide a password to be used for authenticating with the broker.
    #[structopt(short = "P", long)]
    password: Option<String>,

    /// The MQTT topic to subscribe to.
    #[structopt(short, long)]
    topic: String,
}

#[derive(Default)]
struct Printer;

impl Events for Printer {
    fn on_connected(&mut self, status: Status) {
        info!("connected: {}", status);
    }

    fn on_subscribe(&mut self, status: Status, payload: &[u8], topic: &[u8]) {
        if status == Status::Successful && !topic.is_empty() {
            println!(
                "{}: {}",
                String::from_utf8_lossy(topic),
                String::from_utf8_lossy(payload)
            );
        } else {
            info!("subscription event: {}", status);
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> io::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("{:#?}", opt);

    let stream = TcpStream::connect((opt.host.as_str(), opt.port))?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;

    let mut client = Client::new(stream.try_clone()?, stream, Printer::default(), 8 * 1024);

    let client_id = opt
        .id
        .clone()
        .unwrap_or_else(|| format!("sub{}", process::id()));
    let mut request = ConnectRequest::new(&client_id);
    request.keep_alive = opt.keep_alive;
    request.username = opt.username.as_deref();
    request.password = opt.password.as_deref().map(str::as_bytes);

    let status = client.connect(request, Duration::from_secs(10));
    if status != Status::Successful {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("connect rejected: {}", status),
        ));
    }

    let status = client.subscribe(&opt.topic);
    if status != Status::Successful {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("subscribe rejected: {}", status),
        ));
    }

    loop {
        // the read timeout above bounds this, so the tick below stays honest
        client.poll();
        client.keepalive(POLL_INTERVAL.as_millis() as u32);
    }
}
