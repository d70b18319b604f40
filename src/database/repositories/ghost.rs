use serde::{Deserialize, Serialize};

use crate::database::client::{RepositoryClient, RepositoryError};
use crate::database::models::{GhostModes, GhostScope, GhostStatus};

/// 隐身配置行，family_id为空表示全局开关
#[derive(Deserialize)]
struct GhostRow {
    #[serde(default)]
    family_id: Option<String>,
    enabled: bool,
}

#[derive(Serialize)]
struct GhostUpsert<'a> {
    user_id: &'a str,
    family_id: Option<&'a str>,
    enabled: bool,
}

/// 隐身模式存储库
pub struct GhostRepository {
    client: Option<RepositoryClient>,
}

impl GhostRepository {
    pub fn new(client: Option<RepositoryClient>) -> Self {
        Self { client }
    }

    fn client(&self) -> Result<&RepositoryClient, RepositoryError> {
        self.client.as_ref().ok_or(RepositoryError::NotConfigured)
    }

    /// 写入全局隐身开关
    pub async fn set_global_ghost(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        let client = self.client()?;
        client
            .upsert(
                "ghost_modes",
                "user_id,family_id",
                &[GhostUpsert {
                    user_id,
                    family_id: None,
                    enabled,
                }],
            )
            .await
    }

    /// 写入针对单个家庭的隐身开关
    pub async fn set_family_ghost(
        &self,
        user_id: &str,
        family_id: &str,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        let client = self.client()?;
        client
            .upsert(
                "ghost_modes",
                "user_id,family_id",
                &[GhostUpsert {
                    user_id,
                    family_id: Some(family_id),
                    enabled,
                }],
            )
            .await
    }

    /// 判定用户对某个家庭是否隐身
    /// 全局开关优先于家庭开关
    pub async fn is_ghost(
        &self,
        user_id: &str,
        family_id: &str,
    ) -> Result<GhostStatus, RepositoryError> {
        let client = self.client()?;

        let rows: Vec<GhostRow> = client
            .select(
                "ghost_modes",
                &[
                    ("user_id", &format!("eq.{}", user_id)),
                    (
                        "or",
                        &format!("(family_id.is.null,family_id.eq.{})", family_id),
                    ),
                    ("select", "family_id,enabled"),
                ],
            )
            .await?;

        let mut status = GhostStatus::off();
        for row in rows {
            match row.family_id {
                None if row.enabled => {
                    return Ok(GhostStatus {
                        enabled: true,
                        scope: GhostScope::Global,
                    });
                }
                Some(_) if row.enabled => {
                    status = GhostStatus {
                        enabled: true,
                        scope: GhostScope::Family,
                    };
                }
                _ => {}
            }
        }
        Ok(status)
    }

    /// 查询用户的完整隐身配置
    pub async fn ghost_modes_of(&self, user_id: &str) -> Result<GhostModes, RepositoryError> {
        let client = self.client()?;

        let rows: Vec<GhostRow> = client
            .select(
                "ghost_modes",
                &[
                    ("user_id", &format!("eq.{}", user_id)),
                    ("select", "family_id,enabled"),
                ],
            )
            .await?;

        let mut modes = GhostModes::default();
        for row in rows {
            match row.family_id {
                None => modes.global = row.enabled,
                Some(fid) => {
                    modes.per_family.insert(fid, row.enabled);
                }
            }
        }
        Ok(modes)
    }
}
