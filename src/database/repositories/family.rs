use serde::Deserialize;

use crate::database::client::{RepositoryClient, RepositoryError};
use crate::database::models::{FamilyMember, Geofence, Role};

/// 成员关系行，display_name等字段内嵌在用户档案中
#[derive(Deserialize)]
struct MembershipRow {
    user_id: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    joined_at: Option<String>,
    #[serde(default)]
    users: Option<ProfileRow>,
}

#[derive(Deserialize)]
struct ProfileRow {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct FamilyIdRow {
    family_id: String,
}

#[derive(Deserialize)]
struct RoleRow {
    #[serde(default)]
    role: Option<String>,
}

/// 家庭存储库，处理成员关系与地理围栏的权威查询
pub struct FamilyRepository {
    client: Option<RepositoryClient>,
}

impl FamilyRepository {
    /// 创建家庭存储库实例；记录源未配置时所有读查询返回空集
    pub fn new(client: Option<RepositoryClient>) -> Self {
        Self { client }
    }

    fn client(&self) -> Result<&RepositoryClient, RepositoryError> {
        self.client.as_ref().ok_or(RepositoryError::NotConfigured)
    }

    /// 查询家庭的成员列表
    pub async fn members_of(&self, family_id: &str) -> Result<Vec<FamilyMember>, RepositoryError> {
        let client = self.client()?;

        let rows: Vec<MembershipRow> = client
            .select(
                "family_members",
                &[
                    ("family_id", &format!("eq.{}", family_id)),
                    (
                        "select",
                        "user_id,role,joined_at,users(display_name,avatar_url)",
                    ),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let profile = row.users.unwrap_or(ProfileRow {
                    display_name: None,
                    avatar_url: None,
                });
                FamilyMember {
                    display_name: profile.display_name.unwrap_or_else(|| row.user_id.clone()),
                    avatar_url: profile.avatar_url,
                    role: row.role.as_deref().map(Role::parse).unwrap_or(Role::Member),
                    joined_at: row.joined_at,
                    user_id: row.user_id,
                }
            })
            .collect())
    }

    /// 查询用户加入的所有家庭ID
    pub async fn families_of(&self, user_id: &str) -> Result<Vec<String>, RepositoryError> {
        let client = self.client()?;

        let rows: Vec<FamilyIdRow> = client
            .select(
                "family_members",
                &[
                    ("user_id", &format!("eq.{}", user_id)),
                    ("select", "family_id"),
                ],
            )
            .await?;

        Ok(rows.into_iter().map(|row| row.family_id).collect())
    }

    /// 查询用户在某个家庭中的角色
    pub async fn role_of(
        &self,
        user_id: &str,
        family_id: &str,
    ) -> Result<Option<Role>, RepositoryError> {
        let client = self.client()?;

        let rows: Vec<RoleRow> = client
            .select(
                "family_members",
                &[
                    ("user_id", &format!("eq.{}", user_id)),
                    ("family_id", &format!("eq.{}", family_id)),
                    ("select", "role"),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.role.as_deref().map(Role::parse).unwrap_or(Role::Member)))
    }

    /// 查询家庭启用中的地理围栏
    pub async fn geofences_of(&self, family_id: &str) -> Result<Vec<Geofence>, RepositoryError> {
        let client = self.client()?;

        client
            .select(
                "geofences",
                &[
                    ("family_id", &format!("eq.{}", family_id)),
                    ("enabled", "eq.true"),
                    (
                        "select",
                        "id,family_id,name,center_lat,center_lon,radius_m,enabled",
                    ),
                ],
            )
            .await
    }
}
