pub mod codec;
pub mod tcp;

pub use codec::{BackendReply, CodecError, ForwardRequest, ReplyFrame, FORWARD_MAGIC, MAX_FRAME_SIZE};
pub use tcp::{TcpChannel, TcpChannelProvider, TcpConnection, TcpConnectionProvider};
