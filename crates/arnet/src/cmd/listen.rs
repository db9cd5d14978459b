use arnet_peer::{
    CloseReason, ConnectionConfig, Connector, Device, DeviceEvent, HandshakeConfig,
};
use tracing::info;

use crate::cmd::{connector, parse_duration, runtime, Context, ListenArgs};
use crate::exit::{connection_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{event_record, print_event};

pub fn run(args: ListenArgs, context: &Context) -> CliResult<i32> {
    let keepalive = parse_duration(&args.device.keepalive)?;
    let connect_timeout = parse_duration(&args.device.connect_timeout)?;
    let catalog = context.load_catalog()?;
    let controller_name = args.device.controller_name.clone();

    let connector = connector(&args.device.device, catalog, |connector| {
        let mut handshake = HandshakeConfig {
            timeout: connect_timeout,
            ..HandshakeConfig::default()
        };
        if let Some(name) = controller_name {
            handshake.controller_name = name;
        }
        connector
            .with_handshake_config(handshake)
            .with_connection_config(ConnectionConfig { keepalive })
    })?;

    runtime()?.block_on(async move {
        let (handle, events) = connector
            .connect()
            .await
            .map_err(|err| connection_error("connect failed", err))?;
        let mut device = Device::new(connector.uid(), handle, events);
        listen(&mut device, &args, context).await
    })
}

async fn listen(device: &mut Device, args: &ListenArgs, context: &Context) -> CliResult<i32> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0usize;
    loop {
        let event = tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, closing connection");
                device.close();
                device.handle().closed().await;
                return Ok(SUCCESS);
            }
            event = device.next_event() => event,
        };
        let Some(event) = event else {
            return Ok(SUCCESS);
        };

        if args.messages_only && matches!(event, DeviceEvent::PropertyChanged { .. }) {
            continue;
        }
        if let Some(record) = event_record(device.uid(), &event) {
            print_event(&record, context.format);
            if record.is_data() {
                printed = printed.saturating_add(1);
            }
        }

        if let DeviceEvent::Disconnected(reason) = event {
            return match reason {
                CloseReason::Requested => Ok(SUCCESS),
                CloseReason::KeepaliveTimeout => Err(CliError::new(
                    TIMEOUT,
                    "device stopped responding (keepalive timeout)",
                )),
                CloseReason::TransportClosed => {
                    Err(CliError::new(FAILURE, "device link closed"))
                }
            };
        }

        if let Some(count) = args.count {
            if printed >= count {
                device.close();
                device.handle().closed().await;
                return Ok(SUCCESS);
            }
        }
    }
}
