use comms::{
    CommsErr,
    msg::{JobData, Msg, Solution},
};
use tokio::io::{self, AsyncWriteExt};

fn sample_solution() -> Solution {
    Solution {
        rx: vec![0.25, -0.75],
        cx: vec![0.5, -0.25, -0.25],
        rm: vec![1.5, 2.0],
        cm: vec![0.5, 1.0, 3.0],
        a: 1.75,
        error: 12.5,
        timestamp: 1_700_000_000_000,
    }
}

#[tokio::test]
async fn send_recv_roundtrip() {
    const SIZE: usize = 4096;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let (rx, tx2) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx2);

    let msgs = [
        Msg::Join {
            name: "bot-7".into(),
        },
        Msg::Error { error: 3.5 },
        Msg::JobData {
            job_data: JobData {
                nrow: 2,
                ncol: 3,
                row_labels: vec!["a".into(), "b".into()],
                column_labels: vec!["x".into(), "y".into(), "z".into()],
                data: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            },
        },
        Msg::UpdateSolution {
            solution: sample_solution(),
        },
        Msg::RandomStart,
        Msg::SendSolution,
        Msg::Stop,
        Msg::Start,
        Msg::Quit,
    ];

    for msg in &msgs {
        tx.send(msg).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(*msg, received);
    }
}

#[tokio::test]
async fn malformed_frame_does_not_poison_the_stream() {
    const SIZE: usize = 4096;

    let (one, two) = io::duplex(SIZE);
    let (rx, mut raw_tx) = io::split(one);

    // A correctly framed payload that is not valid JSON.
    let garbage = b"not json at all";
    raw_tx
        .write_all(&(garbage.len() as u64).to_be_bytes())
        .await
        .unwrap();
    raw_tx.write_all(garbage).await.unwrap();

    let (_, mut tx) = comms::channel(rx, raw_tx);
    tx.send(&Msg::Error { error: 1.0 }).await.unwrap();

    let (rx, tx2) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx2);

    match rx.recv().await {
        Err(CommsErr::Malformed(_)) => {}
        other => panic!("expected a malformed frame, got {other:?}"),
    }

    // The next frame decodes fine.
    let received = rx.recv().await.unwrap();
    assert_eq!(received, Msg::Error { error: 1.0 });
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    const SIZE: usize = 64;

    let (one, two) = io::duplex(SIZE);
    let (_, mut raw_tx) = io::split(one);

    raw_tx.write_all(&u64::MAX.to_be_bytes()).await.unwrap();

    let (rx, tx2) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx2);

    match rx.recv().await {
        Err(CommsErr::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::InvalidData),
        other => panic!("expected an io rejection, got {other:?}"),
    }
}

#[test]
fn wire_names_are_snake_case_commands() {
    let encoded = serde_json::to_string(&Msg::RandomStart).unwrap();
    assert_eq!(encoded, r#"{"cmd":"random_start"}"#);

    let encoded = serde_json::to_string(&Msg::Error { error: 2.0 }).unwrap();
    assert_eq!(encoded, r#"{"cmd":"error","error":2.0}"#);

    let decoded: Msg = serde_json::from_str(r#"{"cmd":"send_solution"}"#).unwrap();
    assert_eq!(decoded, Msg::SendSolution);
}
