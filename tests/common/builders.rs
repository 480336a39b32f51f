//! Test data builders for schemas, instances and registries

use std::sync::Arc;
use ui_datasource::schema::{
    EnumDescription, FieldType, StaticReflection, StructDescription,
};
use ui_datasource::{
    DataSource, RegistrationHandle, Registry, Schema, SchemaStore, SharedInstance, StructInstance,
    Tag, TypedValue,
};

/// Reflection data for a small game HUD
///
/// - `PlayerStats` (12 bytes): health, mana (f32), level (u16), stance (enum), alive
/// - `Slot` (8 bytes): item_id (i32), count (u16)
/// - `Inventory` (40 bytes): owner (16-byte string), slots (3 x Slot)
pub fn hud_reflection() -> StaticReflection {
    StaticReflection::new()
        .with_struct(
            StructDescription::new("PlayerStats", 12)
                .field("health", FieldType::Float, 0, 4)
                .field("mana", FieldType::Float, 4, 4)
                .field("level", FieldType::Uint, 8, 2)
                .field("stance", FieldType::Enum("Stance".into()), 10, 1)
                .field("alive", FieldType::Bool, 11, 1),
        )
        .with_struct(
            StructDescription::new("Slot", 8)
                .field("item_id", FieldType::Int, 0, 4)
                .field("count", FieldType::Uint, 4, 2),
        )
        .with_struct(
            StructDescription::new("Inventory", 40)
                .field("owner", FieldType::String, 0, 16)
                .field(
                    "slots",
                    FieldType::array(FieldType::Struct("Slot".into()), 3),
                    16,
                    24,
                ),
        )
        .with_enum(
            EnumDescription::new("Stance")
                .variant("Idle", 0)
                .variant("Guard", 1)
                .variant("Sprint", 2),
        )
}

/// Builder for a struct instance with selected fields set
pub struct InstanceBuilder {
    instance: StructInstance,
}

impl InstanceBuilder {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            instance: StructInstance::zeroed(schema),
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<TypedValue>) -> Self {
        let value = value.into();
        self.instance
            .view_mut()
            .write_by_name(field, &value)
            .unwrap_or_else(|e| panic!("cannot set {}: {}", field, e));
        self
    }

    pub fn build(self) -> SharedInstance {
        self.instance.into_shared()
    }
}

/// A schema store over [`hud_reflection`] plus an empty registry
pub struct HudFixture {
    pub store: SchemaStore,
    pub registry: Registry,
}

impl HudFixture {
    pub fn new() -> Self {
        Self {
            store: SchemaStore::new(hud_reflection()),
            registry: Registry::new(),
        }
    }

    pub fn schema(&self, type_name: &str) -> Arc<Schema> {
        self.store
            .get_or_build(type_name)
            .unwrap_or_else(|e| panic!("schema {}: {}", type_name, e))
    }

    pub fn instance(&self, type_name: &str) -> InstanceBuilder {
        InstanceBuilder::new(self.schema(type_name))
    }

    /// Player stats with the given health and mana
    pub fn player_stats(&self, health: f32, mana: f32) -> SharedInstance {
        self.instance("PlayerStats")
            .set("health", health)
            .set("mana", mana)
            .set("level", 3)
            .set("alive", true)
            .build()
    }

    /// Register an instance the registry owns
    pub fn register_owned(&self, tag: Tag, instance: SharedInstance) -> RegistrationHandle {
        self.registry
            .register(tag, DataSource::owned(instance))
            .expect("registration should succeed")
    }
}
