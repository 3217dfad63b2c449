use super::*;
use crate::MessageType;
use crate::RecordCategory;
use crate::RecordImage;
use crate::RecordValue;

#[tokio::test]
async fn channel_transport_delivers_encoded_envelope() {
    let (transport, mut rx) = ChannelTransport::pair();
    let mut env = Envelope::new(MessageType::Set);
    env.marshal(&RecordImage::ephemeral(
        RecordCategory::Config,
        "proxy.config.a",
        RecordValue::Int(1),
    ));

    transport.send(env.clone()).unwrap();

    let bytes = rx.recv().await.unwrap();
    let back = Envelope::from_bytes(&bytes).unwrap();
    assert_eq!(back.msg_type(), MessageType::Set);
    assert_eq!(back.iter().next().unwrap().name, "proxy.config.a");
}

#[test]
fn channel_transport_fails_once_receiver_dropped() {
    let (transport, rx) = ChannelTransport::pair();
    drop(rx);

    let err = transport.send(Envelope::new(MessageType::Push)).unwrap_err();
    assert!(matches!(
        err,
        crate::Error::System(crate::SystemError::Transport(TransportError::ChannelClosed {
            msg_type: MessageType::Push
        }))
    ));
}

#[test]
fn null_transport_accepts_everything() {
    assert!(NullTransport.send(Envelope::new(MessageType::PullReq)).is_ok());
}
