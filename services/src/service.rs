//! 远程服务抽象

use protocol::{ParamValue, RemoteException};

/// 可被远程调用的服务对象
///
/// Rust 没有运行期反射，服务按方法名显式分发；
/// 未知方法名返回 [`RemoteException`]。
pub trait RemoteService: Send + Sync {
    /// 服务版本，随异常记录回传客户端
    fn version(&self) -> &str {
        "1.0"
    }

    /// 执行一次方法调用
    fn invoke(
        &self,
        method: &str,
        params: &[ParamValue],
    ) -> std::result::Result<Option<ParamValue>, RemoteException>;
}
