//! 역할 기반 접근 제어 (RBAC).
//!
//! 토큰 claims에 실리는 사용자 역할과 권한 정의.

use serde::{Deserialize, Serialize};

/// 사용자 역할.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 관리자 - 모든 권한 보유
    Admin,
    /// 일반 사용자 - 자기 계정 관리 및 조회
    #[default]
    User,
}

impl Role {
    /// 역할이 특정 권한을 가지는지 확인.
    pub fn has_permission(&self, permission: Permission) -> bool {
        match self {
            Role::Admin => true,
            Role::User => matches!(
                permission,
                Permission::ViewUsers | Permission::ManageOwnAccount
            ),
        }
    }

    /// 역할의 우선순위 레벨 반환 (높을수록 더 많은 권한).
    pub fn level(&self) -> u8 {
        match self {
            Role::Admin => 100,
            Role::User => 10,
        }
    }

    /// 문자열에서 역할 파싱.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::User => "user",
        };
        write!(f, "{}", s)
    }
}

/// 시스템 권한.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// 사용자 목록/상세 조회
    ViewUsers,
    /// 자기 계정 수정/삭제
    ManageOwnAccount,
    /// 다른 사용자 계정 수정/삭제
    ManageUsers,
}

impl Permission {
    /// 권한에 대한 설명 반환.
    pub fn description(&self) -> &'static str {
        match self {
            Permission::ViewUsers => "사용자 조회",
            Permission::ManageOwnAccount => "자기 계정 관리",
            Permission::ManageUsers => "사용자 관리",
        }
    }
}
