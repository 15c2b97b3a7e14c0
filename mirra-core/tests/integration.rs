//! End-to-end pipeline tests over loopback TCP.
//!
//! A fake device feeds the video wire format into the stream worker
//! while the controller worker's output is read back and compared
//! byte-for-byte, mirroring how the real session wires the pieces.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mirra_core::{
    CommandAction, ControlEvent, ControlMessage, FrameSink, KeyAction, MotionAction, Position,
    Size, StreamNotice, StreamWorker, VideoPacket, controller,
};

async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    (client, server)
}

fn annexb(nal: &[u8]) -> Vec<u8> {
    let mut v = vec![0, 0, 0, 1];
    v.extend_from_slice(nal);
    v
}

#[tokio::test]
async fn config_then_keyframe_reaches_decoder_as_one_packet() {
    let (device_end, host_end) = tcp_pair().await;

    let (sink, mut frame_rx) = FrameSink::new();
    let worker = StreamWorker::new(Some(Box::new(sink)), None);
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let handle = worker.spawn(host_end, CancellationToken::new(), notice_tx);

    let sps = annexb(&[0x67, 0x64, 0x00, 0x28]);
    let pps = annexb(&[0x68, 0xEE, 0x3C, 0x80]);
    let idr = annexb(&[0x65, 0x88, 0x84, 0x00]);

    let mut device_end = device_end;
    device_end
        .write_all(&VideoPacket::config(sps.clone()).encode())
        .await
        .unwrap();
    device_end
        .write_all(&VideoPacket::config(pps.clone()).encode())
        .await
        .unwrap();
    device_end
        .write_all(&VideoPacket::data(1000, idr.clone()).encode())
        .await
        .unwrap();

    frame_rx.changed().await.unwrap();
    let frame = frame_rx.borrow_and_update().clone().unwrap();
    assert_eq!(frame.pts, 1000);
    assert!(frame.key);
    let expected: Vec<u8> = [sps, pps, idr].concat();
    assert_eq!(&frame.data[..], &expected[..]);

    // Closing the socket ends the stream cleanly.
    drop(device_end);
    assert_eq!(notice_rx.recv().await, Some(StreamNotice::Stopped));
    handle.await.unwrap();
}

#[tokio::test]
async fn decoder_interrupt_stops_the_stream() {
    let (device_end, host_end) = tcp_pair().await;

    let (sink, _frame_rx) = FrameSink::new();
    let interrupt = sink.interrupt_handle();
    let worker = StreamWorker::new(Some(Box::new(sink)), None);
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let handle = worker.spawn(host_end, CancellationToken::new(), notice_tx);

    interrupt.interrupt();

    let mut device_end = device_end;
    device_end
        .write_all(&VideoPacket::data(1, annexb(&[0x41])).encode())
        .await
        .unwrap();

    // The next push returns false and the worker unwinds without the
    // socket being closed.
    assert_eq!(notice_rx.recv().await, Some(StreamNotice::Stopped));
    handle.await.unwrap();
}

#[tokio::test]
async fn controller_writes_fifo_byte_stream() {
    let (host_end, mut device_end) = tcp_pair().await;

    let token = CancellationToken::new();
    let (handle, worker) = controller::spawn(host_end, token.clone());

    let position = Position::new(100, 200, Size {
        width: 1080,
        height: 1920,
    });
    let messages = vec![
        ControlMessage::new(0, ControlEvent::Command {
            action: CommandAction::Ping,
        }),
        ControlMessage::new(5, ControlEvent::Keycode {
            action: KeyAction::Down,
            keycode: 4,
            metastate: 0,
        }),
        ControlMessage::new(9, ControlEvent::Mouse {
            action: MotionAction::Down,
            buttons: 1,
            position,
        }),
        ControlMessage::new(12, ControlEvent::SetClipboard {
            text: "shared text".into(),
        }),
    ];

    let mut expected = BytesMut::new();
    for msg in &messages {
        msg.serialize(&mut expected).unwrap();
    }
    for msg in messages {
        assert!(handle.push(msg));
    }

    let mut got = vec![0u8; expected.len()];
    device_end.read_exact(&mut got).await.unwrap();
    assert_eq!(&got[..], &expected[..]);

    token.cancel();
    worker.await.unwrap();
    assert!(!handle.push(ControlMessage::new(99, ControlEvent::Command {
        action: CommandAction::Quit,
    })));
}

#[tokio::test]
async fn stream_and_controller_shut_down_in_order() {
    let (video_device, video_host) = tcp_pair().await;
    let (control_host, _control_device) = tcp_pair().await;

    let (sink, _frame_rx) = FrameSink::new();
    let interrupt = sink.interrupt_handle();
    let stream_token = CancellationToken::new();
    let (stream_notice_tx, mut stream_notice_rx) = mpsc::unbounded_channel();
    let stream_handle = StreamWorker::new(Some(Box::new(sink)), None).spawn(
        video_host,
        stream_token.clone(),
        stream_notice_tx,
    );

    let control_token = CancellationToken::new();
    let (control_handle, control_worker) = controller::spawn(control_host, control_token.clone());

    // 1. Stop the stream worker.
    interrupt.interrupt();
    stream_token.cancel();
    assert_eq!(stream_notice_rx.recv().await, Some(StreamNotice::Stopped));

    // 2. Stop the controller.
    control_token.cancel();

    // 3. Join both; all blocking points have been released.
    stream_handle.await.unwrap();
    control_worker.await.unwrap();

    assert!(!control_handle.push(ControlMessage::new(0, ControlEvent::Command {
        action: CommandAction::Quit,
    })));
    drop(video_device);
}
