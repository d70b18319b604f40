// 会话网关模块
// 负责socket认证、房间加入、入站事件分发与总线事件转发

pub mod handler;
pub mod protocol;
pub mod rooms;
pub mod session;

pub use handler::ws_handler;
pub use rooms::{family_room, RoomRegistry};
pub use session::{SessionRegistry, SocketHandle};
