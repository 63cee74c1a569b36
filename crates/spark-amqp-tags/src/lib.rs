//! `spark-amqp-tags`：AMQP 投递标签。
//!
//! # 模块定位（Why）
//! - 投递标签是链路上关联一次投递的不透明字节串，发送端为每次投递生成一个；
//! - 不同链路对标签有不同诉求：不需要关联时用零长度标签，需要可读顺序号时用顺序标签，
//!   高吞吐场景希望复用已结算投递的标签对象，跨进程唯一时使用 UUID。
//!
//! # 设计概要（How）
//! - [`DeliveryTag`]：共享的不可变字节串，相等性按字节比较，身份通过 [`DeliveryTag::ptr_eq`] 观察；
//! - [`DeliveryTagGenerator`]：四种策略的统一入口，由 [`DeliveryTagStrategy`] 在配置阶段选择；
//! - [`width_for`]：顺序标签与池溢出标签共用的最小宽度编码。

extern crate alloc;

mod empty;
mod generator;
mod pooled;
mod sequential;
mod tag;
mod uuid_tag;
mod width;

pub use empty::EmptyTagGenerator;
pub use generator::{DeliveryTagGenerator, DeliveryTagStrategy};
pub use pooled::{DEFAULT_POOL_CAPACITY, MAX_POOL_CAPACITY, PooledTagGenerator};
pub use sequential::SequentialTagGenerator;
pub use tag::DeliveryTag;
pub use uuid_tag::UuidTagGenerator;
pub use width::{decode_minimal, width_for};
