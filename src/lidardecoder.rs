// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_schemas::{
    builtin_interfaces::Time,
    geometry_msgs::{Quaternion, Transform, TransformStamped, Vector3},
    serde_cdr,
    std_msgs::Header,
};
use kanal::{AsyncReceiver, AsyncSender};
use lidardecoder::{
    calibration::{Calibration, MetadataFile},
    common::{set_process_priority, timestamp},
    config::ConfigUpdate,
    format::{format_camera_info, format_cloud, format_raster},
    Decoder, Event, RuntimeConfig, Sweep,
};
use serde::Serialize;
use std::{sync::Arc, thread, time::Duration};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};
use tracy_client::{frame_mark, plot};
use zenoh::{
    bytes::{Encoding, ZBytes},
    pubsub::Publisher,
    qos::{CongestionControl, Priority},
    Session,
};

#[cfg(feature = "profiling")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    args.tracy.then(tracy_client::Client::start);

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let tracy = match args.tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    tracing_log::LogTracer::init()?;

    let session = zenoh::open(args.clone()).await?;

    let calibration = match &args.calibration {
        Some(path) => Calibration::load(&MetadataFile::new(path)),
        None => {
            warn!("no sensor metadata configured, revert to default");
            Calibration::default()
        }
    };
    info!("Hostname: {}", calibration.hostname());
    info!("Lidar mode: {}", calibration.mode());
    debug!("Lidar to sensor: {:?}", calibration.lidar_to_sensor());
    debug!("IMU to sensor: {:?}", calibration.imu_to_sensor());
    let calibration = Arc::new(calibration);

    let tf_session = session.clone();
    let tf_msg = TransformStamped {
        header: Header {
            frame_id: args.base_frame_id.clone(),
            stamp: timestamp().unwrap_or(Time { sec: 0, nanosec: 0 }),
        },
        child_frame_id: args.lidar_frame_id.clone(),
        transform: Transform {
            translation: Vector3 {
                x: args.lidar_tf_vec[0],
                y: args.lidar_tf_vec[1],
                z: args.lidar_tf_vec[2],
            },
            rotation: Quaternion {
                x: args.lidar_tf_quat[0],
                y: args.lidar_tf_quat[1],
                z: args.lidar_tf_quat[2],
                w: args.lidar_tf_quat[3],
            },
        },
    };
    let (tf_msg, tf_enc) = encode(&tf_msg, "geometry_msgs/msg/TransformStamped")?;
    let tf_task = tokio::spawn(async move {
        if let Err(e) = tf_static(tf_session, tf_msg, tf_enc).await {
            error!("tf_static error: {:?}", e);
        }
    });
    std::mem::drop(tf_task);

    // Every input is forwarded into a single queue so the decoder sees
    // packets and reconfiguration requests in strict arrival order.
    let (tx, rx) = kanal::bounded_async(2048);

    let packets_task = tokio::spawn(forward(
        session.clone(),
        args.packets_topic.clone(),
        tx.clone(),
        Event::LidarPacket,
    ));
    std::mem::drop(packets_task);

    let imu_task = tokio::spawn(forward(
        session.clone(),
        args.imu_packets_topic.clone(),
        tx.clone(),
        Event::ImuPacket,
    ));
    std::mem::drop(imu_task);

    let config_task = tokio::spawn(reconfigure(
        session.clone(),
        args.config_topic.clone(),
        args.runtime_config(),
        tx,
    ));
    std::mem::drop(config_task);

    let decode_session = session.clone();
    let decode_args = args.clone();
    let decode_thread = thread::Builder::new()
        .name("decoder".to_string())
        .spawn(move || -> Result<(), String> {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| e.to_string())?
                .block_on(decode_loop(decode_session, decode_args, calibration, rx))
                .map_err(|e| e.to_string())
        })?;

    match tokio::task::spawn_blocking(move || decode_thread.join()).await? {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err("decoder thread panicked".into()),
    }
}

/// Forwards raw packets from a topic into the decoder queue.
async fn forward(
    session: Session,
    topic: String,
    tx: AsyncSender<Event>,
    event: fn(Vec<u8>) -> Event,
) -> TaskResult {
    let subscriber = session.declare_subscriber(topic.clone()).await?;
    info!("subscribed to {}", topic);

    loop {
        match subscriber.recv_async().await {
            Ok(sample) => tx.send(event(sample.payload().to_bytes().to_vec())).await?,
            Err(e) => {
                error!("{} subscriber error: {:?}", topic, e);
                return Err(e);
            }
        }
    }
}

/// Turns JSON reconfiguration requests into decoder events.  Requests may be
/// partial and are overlaid on the previous request.
async fn reconfigure(
    session: Session,
    topic: String,
    mut requested: RuntimeConfig,
    tx: AsyncSender<Event>,
) -> TaskResult {
    let subscriber = session.declare_subscriber(topic.clone()).await?;
    info!("subscribed to {}", topic);

    loop {
        let sample = subscriber.recv_async().await?;
        match serde_json::from_slice::<ConfigUpdate>(&sample.payload().to_bytes()) {
            Ok(update) => {
                requested = requested.apply(&update);
                tx.send(Event::Reconfigure(requested)).await?;
            }
            Err(e) => warn!("ignoring invalid {} request: {}", topic, e),
        }
    }
}

struct Publishers {
    image: Publisher<'static>,
    camera_info: Publisher<'static>,
    points: Publisher<'static>,
}

async fn declare(session: &Session, topic: &str) -> Result<Publisher<'static>, zenoh::Error> {
    match session
        .declare_publisher(topic.to_string())
        .priority(Priority::DataHigh)
        .congestion_control(CongestionControl::Drop)
        .await
    {
        Ok(v) => Ok(v),
        Err(e) => {
            error!("Failed to create publisher {}: {:?}", topic, e);
            Err(e)
        }
    }
}

async fn decode_loop(
    session: Session,
    args: Args,
    calibration: Arc<Calibration>,
    rx: AsyncReceiver<Event>,
) -> TaskResult {
    set_process_priority();

    let publishers = Publishers {
        image: declare(&session, &args.image_topic).await?,
        camera_info: declare(&session, &args.camera_info_topic).await?,
        points: declare(&session, &args.points_topic).await?,
    };

    let mut decoder = Decoder::new(calibration, args.runtime_config());

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(e) => {
                error!("recv error: {:?}", e);
                return Err(e.into());
            }
        };

        match decoder.handle(event) {
            Ok(Some(sweep)) => {
                args.tracy.then(|| {
                    plot!("sweep points", sweep.cloud.len() as f64);
                    plot!("sweep returns", sweep.raster.valid_cells() as f64);
                });

                if let Err(e) = publish(&publishers, &decoder, sweep, &args.lidar_frame_id).await {
                    error!("publish sweep error: {:?}", e);
                }

                args.tracy.then(frame_mark);
            }
            Ok(None) => (),
            Err(err) => error!("dropping malformed lidar packet: {}", err),
        }
    }
}

#[instrument(skip_all, fields(frame = sweep.frame_id))]
async fn publish(
    publishers: &Publishers,
    decoder: &Decoder,
    sweep: Sweep,
    frame_id: &str,
) -> TaskResult {
    let header = Header {
        stamp: timestamp()?,
        frame_id: frame_id.to_string(),
    };

    let image = format_raster(&sweep.raster, header.clone());
    let info = format_camera_info(&sweep.raster, decoder.calibration(), header.clone());
    let cloud = format_cloud(&sweep.cloud, header);

    let (image, image_enc) = encode(&image, "sensor_msgs/msg/Image")?;
    let (info, info_enc) = encode(&info, "sensor_msgs/msg/CameraInfo")?;
    let (cloud, cloud_enc) = encode(&cloud, "sensor_msgs/msg/PointCloud2")?;

    // The raster and its camera info go out together, then the cloud.
    let span = info_span!("sweep_publish");
    async {
        publishers.image.put(image).encoding(image_enc).await?;
        publishers.camera_info.put(info).encoding(info_enc).await?;
        publishers.points.put(cloud).encoding(cloud_enc).await
    }
    .instrument(span)
    .await
}

fn encode<T: Serialize>(
    msg: &T,
    schema: &str,
) -> Result<(ZBytes, Encoding), Box<dyn std::error::Error + Send + Sync>> {
    let msg = ZBytes::from(serde_cdr::serialize(msg)?);
    let enc = Encoding::APPLICATION_CDR.with_schema(schema);
    Ok((msg, enc))
}

async fn tf_static(session: Session, msg: ZBytes, enc: Encoding) -> TaskResult {
    let topic = "rt/tf_static".to_string();
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        interval.tick().await;
        let span = info_span!("tf_static_publish");
        async { session.put(&topic, msg.clone()).encoding(enc.clone()).await }
            .instrument(span)
            .await?;
    }
}
