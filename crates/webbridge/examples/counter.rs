//! In-process counter host wired over the channel transport.
//!
//! The host side exposes one object (`app`) with a `count` property and
//! `increment`/`reset` functions, answers GET/SET/INVOKE requests, and
//! pushes a `propertyUpdated` event whenever the counter changes. The
//! script side talks to it purely through a proxy handle.
//!
//! Run with:
//!   cargo run -p webbridge --example counter

use serde_json::{json, Value};
use tokio::sync::mpsc;

use webbridge::{
    Bridge, BridgeConfig, ChannelTransport, Inbound, Invocable, ObjectId, PropertyUpdate,
    Readable, Request, RequestBody, Writable, PROPERTY_UPDATED,
};

/// Minimal host loop: one counter object, id `counter-1`.
async fn run_host(
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::Sender<String>,
) {
    let counter_id = ObjectId::from("counter-1");
    let mut count: i64 = 0;

    while let Some(raw) = outbound.recv().await {
        let request = match Request::from_wire(&raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "host dropped malformed request");
                continue;
            }
        };

        let mutating = !matches!(request.body, RequestBody::Get { .. });
        let reply = match request.body {
            RequestBody::Get { ref id, ref property } if *id == counter_id && property == "count" => {
                Inbound::ok(request.request_id, json!(count))
            }
            RequestBody::Set {
                ref id,
                ref property,
                ref new_value,
            } if *id == counter_id && property == "count" => match new_value.as_i64() {
                Some(n) => {
                    count = n;
                    Inbound::ok(request.request_id, Value::Null)
                }
                None => Inbound::err(request.request_id, "count must be an integer"),
            },
            RequestBody::Invoke {
                ref id,
                ref function,
                ..
            } if *id == counter_id => match function.as_str() {
                "increment" => {
                    count += 1;
                    Inbound::ok(request.request_id, json!(count))
                }
                "reset" => {
                    count = 0;
                    Inbound::ok(request.request_id, json!(count))
                }
                other => Inbound::err(request.request_id, format!("no such function: {other}")),
            },
            _ => Inbound::err(request.request_id, "no such object or member"),
        };

        if inbound.send(reply.to_wire().unwrap()).await.is_err() {
            break;
        }

        // Mutating requests get a propertyUpdated push, so the script-side
        // cache converges without polling.
        if mutating {
            let update = PropertyUpdate {
                object_id: counter_id.clone(),
                property: "count".into(),
                value: json!(count),
            };
            let event = Inbound::event(PROPERTY_UPDATED, serde_json::to_value(&update).unwrap());
            if inbound.send(event.to_wire().unwrap()).await.is_err() {
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> webbridge::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (transport, outbound) = ChannelTransport::new();
    let bridge = Bridge::new(transport, BridgeConfig::default());
    bridge.initialize();
    let inbound = bridge.spawn_inbound_pump();
    tokio::spawn(run_host(outbound, inbound));

    let counter_id = ObjectId::from("counter-1");
    let app = bridge.register_object("app", counter_id.clone())?;
    bridge.define_property(&counter_id, "count")?;
    bridge.define_function(&counter_id, "increment")?;
    bridge.define_function(&counter_id, "reset")?;

    println!("cached before any fetch: {:?}", app.read("count"));
    println!("fetched from host:       {}", app.fetch("count").await?);

    for _ in 0..3 {
        let value = app.invoke("increment", vec![]).await?;
        println!("increment returned:      {value}");
    }

    let ack = app.write("count", json!(40))?;
    ack.wait().await?;
    println!("after SET to 40:         {}", app.fetch("count").await?);

    let value = app.invoke("reset", vec![]).await?;
    println!("reset returned:          {value}");
    println!("cached after events:     {:?}", app.read("count"));

    bridge.shutdown("example finished");
    Ok(())
}
