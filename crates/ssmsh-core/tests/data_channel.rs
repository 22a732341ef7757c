//! Data channel state-machine tests over the in-memory transport.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use ssmsh_core::channel::{DataChannel, InboundEvent};
use ssmsh_core::error::Error;
use ssmsh_core::protocol::{
    AcknowledgeContent, ActionType, AgentMessage, HandshakeResponsePayload, MessageFlags,
    MessageType, PayloadType, RequestedClientAction,
};
use ssmsh_test_utils::{
    acknowledge, channel_closed, handshake_complete, handshake_request, mock_transport, output_data,
    AgentHandle,
};

const WAIT: Duration = Duration::from_secs(10);

fn channel_with_agent() -> (DataChannel, AgentHandle) {
    let (source, sink, agent) = mock_transport();
    let channel = DataChannel::from_parts(Box::new(source), Box::new(sink));
    (channel, agent)
}

async fn next_message(agent: &mut AgentHandle) -> AgentMessage {
    timeout(WAIT, agent.next_message())
        .await
        .expect("timed out waiting for a client frame")
        .expect("transport closed")
}

fn ack_content(msg: &AgentMessage) -> AcknowledgeContent {
    assert_eq!(msg.message_type, MessageType::Acknowledge);
    serde_json::from_slice(&msg.payload).expect("acknowledge payload parses")
}

#[tokio::test(start_paused = true)]
async fn first_outbound_message_carries_syn_and_sequence_zero() {
    let (channel, mut agent) = channel_with_agent();

    channel.write(b"one").await.unwrap();
    channel.write(b"two").await.unwrap();
    channel.write(b"three").await.unwrap();

    let first = next_message(&mut agent).await;
    assert_eq!(first.flags, MessageFlags::Syn);
    assert_eq!(first.sequence_number, 0);
    assert_eq!(&first.payload[..], b"one");

    let second = next_message(&mut agent).await;
    assert_eq!(second.flags, MessageFlags::Data);
    assert_eq!(second.sequence_number, 1);

    let third = next_message(&mut agent).await;
    assert_eq!(third.sequence_number, 2);
}

#[tokio::test(start_paused = true)]
async fn out_of_order_messages_drain_in_sequence_order() {
    let (channel, mut agent) = channel_with_agent();

    // sequences 2 and 1 arrive ahead of 0 and are held back
    let early = channel
        .handle_message(&output_data(2, b"C").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(early, InboundEvent::Consumed);
    let early = channel
        .handle_message(&output_data(1, b"B").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(early, InboundEvent::Consumed);

    // the gap fill releases everything in order, in one drain
    let drained = channel
        .handle_message(&output_data(0, b"A").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(drained, InboundEvent::Output(Bytes::from_static(b"ABC")));

    // the expected inbound sequence is now 3: the next message in line is
    // delivered immediately
    let next = channel
        .handle_message(&output_data(3, b"D").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(next, InboundEvent::Output(Bytes::from_static(b"D")));

    // each inbound message was acknowledged with its own sequence number
    let mut acked = Vec::new();
    for _ in 0..4 {
        acked.push(ack_content(&next_message(&mut agent).await).acknowledged_message_sequence_number);
    }
    assert_eq!(acked, vec![2, 1, 0, 3]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_of_delivered_message_is_acked_and_discarded() {
    let (channel, mut agent) = channel_with_agent();

    let delivered = channel
        .handle_message(&output_data(0, b"A").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(delivered, InboundEvent::Output(Bytes::from_static(b"A")));

    // a replay of sequence 0 produces no payload but still gets an ack
    let replay = channel
        .handle_message(&output_data(0, b"A").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(replay, InboundEvent::Consumed);

    let first_ack = ack_content(&next_message(&mut agent).await);
    let second_ack = ack_content(&next_message(&mut agent).await);
    assert_eq!(first_ack.acknowledged_message_sequence_number, 0);
    assert_eq!(second_ack.acknowledged_message_sequence_number, 0);
}

#[tokio::test(start_paused = true)]
async fn acknowledged_messages_leave_the_retransmit_sweep() {
    let (channel, mut agent) = channel_with_agent();

    // sequence 0 (syn) plus data sequences 1, 2, 3
    channel.write(b"zero").await.unwrap();
    channel.write(b"one").await.unwrap();
    channel.write(b"two").await.unwrap();
    channel.write(b"three").await.unwrap();

    // the agent acknowledges 0 and 2
    channel
        .handle_message(&acknowledge(0).encode().unwrap())
        .await
        .unwrap();
    channel
        .handle_message(&acknowledge(2).encode().unwrap())
        .await
        .unwrap();

    // drain the four original transmissions
    for expected in 0..4 {
        assert_eq!(next_message(&mut agent).await.sequence_number, expected);
    }

    // the next sweep retransmits only the surviving sequences
    let resent_a = next_message(&mut agent).await;
    let resent_b = next_message(&mut agent).await;
    assert_eq!(
        (resent_a.sequence_number, resent_b.sequence_number),
        (1, 3)
    );
    assert_eq!(&resent_a.payload[..], b"one");
    assert_eq!(&resent_b.payload[..], b"three");
}

#[tokio::test(start_paused = true)]
async fn acknowledge_messages_are_not_retransmitted() {
    let (channel, mut agent) = channel_with_agent();

    // inbound data triggers exactly one outbound ack
    channel
        .handle_message(&output_data(0, b"A").encode().unwrap())
        .await
        .unwrap();
    let ack = next_message(&mut agent).await;
    assert_eq!(ack.message_type, MessageType::Acknowledge);

    // no sweep ever resends it
    let silence = timeout(Duration::from_secs(3), agent.next_message()).await;
    assert!(silence.is_err(), "unexpected retransmission: {silence:?}");
}

#[tokio::test(start_paused = true)]
async fn handshake_request_is_answered_in_kind() {
    let (channel, mut agent) = channel_with_agent();

    let actions = vec![
        RequestedClientAction {
            action_type: ActionType::SessionType,
            action_parameters: serde_json::json!({"SessionType": "Port"}),
        },
        RequestedClientAction {
            action_type: ActionType::KmsEncryption,
            action_parameters: serde_json::Value::Null,
        },
    ];
    let request = handshake_request(0, &actions);
    let event = channel
        .handle_message(&request.encode().unwrap())
        .await
        .unwrap();
    assert_eq!(event, InboundEvent::Consumed);

    // the response goes out before the ack and reuses the request's sequence
    let response = next_message(&mut agent).await;
    assert_eq!(response.payload_type, PayloadType::HandshakeResponse);
    assert_eq!(response.sequence_number, request.sequence_number);

    let body: HandshakeResponsePayload = serde_json::from_slice(&response.payload).unwrap();
    assert_eq!(body.client_version, "0.0.1");
    assert_eq!(body.processed_client_actions.len(), 2);

    let ack = ack_content(&next_message(&mut agent).await);
    assert_eq!(ack.acknowledged_message_sequence_number, 0);

    // handshake responses are exempt from retransmission
    let silence = timeout(Duration::from_secs(3), agent.next_message()).await;
    assert!(silence.is_err(), "unexpected retransmission: {silence:?}");
}

#[tokio::test(start_paused = true)]
async fn handshake_complete_unbuffers_the_channel() {
    let (channel, mut agent) = channel_with_agent();

    agent.send_message(&handshake_complete(0));
    channel.wait_for_handshake_complete().await.unwrap();
    assert!(channel.handshake_complete());

    // the completion frame itself was acknowledged
    let ack = ack_content(&next_message(&mut agent).await);
    assert_eq!(ack.acknowledged_message_type, "output_stream_data");

    // with the reorder buffer gone, a wildly out-of-order sequence is
    // delivered immediately
    let event = channel
        .handle_message(&output_data(40, b"later").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(event, InboundEvent::Output(Bytes::from_static(b"later")));

    // and outbound writes are no longer retransmitted
    channel.write(b"streamed").await.unwrap();
    let _ack_of_40 = next_message(&mut agent).await;
    let sent = next_message(&mut agent).await;
    assert_eq!(&sent.payload[..], b"streamed");
    let silence = timeout(Duration::from_secs(3), agent.next_message()).await;
    assert!(silence.is_err(), "unexpected retransmission: {silence:?}");
}

#[tokio::test(start_paused = true)]
async fn repeated_handshake_complete_is_harmless() {
    let (channel, _agent) = channel_with_agent();

    channel
        .handle_message(&handshake_complete(0).encode().unwrap())
        .await
        .unwrap();
    channel
        .handle_message(&handshake_complete(1).encode().unwrap())
        .await
        .unwrap();
    assert!(channel.handshake_complete());
}

#[tokio::test(start_paused = true)]
async fn pause_publication_holds_writes_until_resume() {
    let (channel, mut agent) = channel_with_agent();

    channel
        .handle_message(&AgentMessage::encode(&pause_message(0)).unwrap())
        .await
        .unwrap();

    // held: buffered but not transmitted
    channel.write(b"held").await.unwrap();
    let silence = timeout(Duration::from_secs(1), agent.next_message()).await;
    assert!(silence.is_err(), "paused channel transmitted: {silence:?}");

    channel
        .handle_message(&AgentMessage::encode(&start_message(1)).unwrap())
        .await
        .unwrap();

    // after resume the ack of start_publication goes straight out, and the
    // sweeper flushes the held message
    let mut seen_payloads = Vec::new();
    for _ in 0..2 {
        let msg = next_message(&mut agent).await;
        if msg.message_type == MessageType::InputStreamData {
            seen_payloads.push(msg.payload.clone());
        }
    }
    assert!(
        seen_payloads.iter().any(|p| &p[..] == b"held"),
        "held message never flushed: {seen_payloads:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn channel_closed_delivers_final_output() {
    let (channel, _agent) = channel_with_agent();

    let event = channel
        .handle_message(&channel_closed(5, "session ended by policy").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(
        event,
        InboundEvent::Closed {
            output: Some(Bytes::from_static(b"session ended by policy"))
        }
    );

    let quiet = channel
        .handle_message(&channel_closed(6, "").encode().unwrap())
        .await
        .unwrap();
    assert_eq!(quiet, InboundEvent::Closed { output: None });
}

#[tokio::test(start_paused = true)]
async fn unknown_message_type_is_rejected() {
    let (channel, _agent) = channel_with_agent();

    let mut odd = AgentMessage::new(MessageType::Other("mystery_envelope".to_string()));
    odd.sequence_number = 0;
    let err = channel
        .handle_message(&odd.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownMessage { .. }), "{err}");

    let mut odd_payload = AgentMessage::new(MessageType::OutputStreamData);
    odd_payload.payload_type = PayloadType::Parameter;
    let err = channel
        .handle_message(&odd_payload.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownMessage { .. }), "{err}");
}

#[tokio::test(start_paused = true)]
async fn read_frame_maps_transport_conditions() {
    let (channel, agent) = channel_with_agent();
    agent.send_frame(ssmsh_core::transport::Frame::Binary(Bytes::from_static(
        &[0u8; 40],
    )));
    let err = channel.read_frame().await.unwrap_err();
    assert!(matches!(err, Error::ShortFrame { len: 40 }), "{err}");

    for code in [Some(1000), Some(1001), Some(1006), None] {
        let (channel, agent) = channel_with_agent();
        agent.close(code);
        let err = channel.read_frame().await.unwrap_err();
        assert!(err.is_end_of_stream(), "code {code:?}: {err}");
    }

    let (channel, agent) = channel_with_agent();
    agent.close(Some(1011));
    let err = channel.read_frame().await.unwrap_err();
    assert!(matches!(err, Error::Transport { .. }), "{err}");
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let (channel, _agent) = channel_with_agent();
    channel.close().await.unwrap();
    channel.close().await.unwrap();
}

fn pause_message(seq: i64) -> AgentMessage {
    let mut msg = AgentMessage::new(MessageType::PausePublication);
    msg.sequence_number = seq;
    msg
}

fn start_message(seq: i64) -> AgentMessage {
    let mut msg = AgentMessage::new(MessageType::StartPublication);
    msg.sequence_number = seq;
    msg
}
