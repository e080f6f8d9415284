use thiserror::Error;

use crate::storage::StorageError;
use crate::validation::ValidationError;

/// 进度存储操作错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("持久化失败: {0}")]
    Persistence(#[from] StorageError),

    #[error("数据校验失败: {0}")]
    Validation(#[from] ValidationError),
}

impl StoreError {
    /// 持久化失败时内存状态未被修改，调用方可以直接重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Persistence(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
