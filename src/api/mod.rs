// REST查询面
// 网关查询能力的只读HTTP镜像，供移动端冷启动与后台拉取

pub mod ghost;
pub mod health;
pub mod location;
