use crate::state::FieldId;

#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
    pub help: &'static str,
}

pub const STEAM_TEMP: Tag = Tag {
    key: "steam_temp",
    metric: "boiler_steam_temperature_celsius",
    help: "Steam boiler temperature reported by the controller",
};

pub const TEMP_TARGET: Tag = Tag {
    key: "temp_target",
    metric: "boiler_target_temperature_celsius",
    help: "Controller temperature set point",
};

pub const BOILER_TEMP: Tag = Tag {
    key: "boiler_temp",
    metric: "boiler_heat_exchanger_temperature_celsius",
    help: "Heat exchanger temperature reported by the controller",
};

pub const COUNTER: Tag = Tag {
    key: "counter",
    metric: "boiler_controller_counter",
    help: "Controller countdown counter",
};

pub const HEATING: Tag = Tag {
    key: "heating",
    metric: "boiler_heating_state",
    help: "Heating element state (1=on, 0=off, -1=unknown)",
};

pub const PUMP_ACTIVE: Tag = Tag {
    key: "pump_active",
    metric: "boiler_pump_active",
    help: "Debounced pump activity (1=active)",
};

pub const LAST_SHOT_SECONDS: Tag = Tag {
    key: "last_shot_s",
    metric: "boiler_last_shot_seconds",
    help: "Duration of the most recent shot in seconds",
};

pub fn for_field(field: FieldId) -> Tag {
    match field {
        FieldId::SteamTemp => STEAM_TEMP,
        FieldId::TempTarget => TEMP_TARGET,
        FieldId::BoilerTemp => BOILER_TEMP,
        FieldId::Counter => COUNTER,
        FieldId::Heating => HEATING,
    }
}
