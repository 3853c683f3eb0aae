use uuid::Uuid;

/// Identity for a single request, passed explicitly through every call.
///
/// Identity never lives in globals or task-locals: requests sharing a worker
/// pool must not be able to observe each other's tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}

impl RequestContext {
    pub fn new(user_id: Uuid, tenant_id: Uuid) -> Self {
        Self { user_id, tenant_id }
    }

    /// True when `owner` is the requesting user.
    pub fn is_owner(&self, owner: Uuid) -> bool {
        self.user_id == owner
    }

    /// True when the record belongs to the requesting tenant.
    pub fn same_tenant(&self, tenant: Uuid) -> bool {
        self.tenant_id == tenant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_checks() {
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let ctx = RequestContext::new(user, tenant);

        assert!(ctx.is_owner(user));
        assert!(!ctx.is_owner(Uuid::new_v4()));
        assert!(ctx.same_tenant(tenant));
        assert!(!ctx.same_tenant(Uuid::new_v4()));
    }
}
