pub mod capture {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure;
}

pub mod control {
    pub mod key_command;
}

pub mod detection {
    pub mod domain {
        pub mod face_locator;
        pub mod object_tracker;
        pub mod tracking_state_machine;
    }
    pub mod infrastructure;
}

pub mod framing {
    pub mod domain {
        pub mod crop_geometry;
        pub mod frame_cropper;
        pub mod framing_engine;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod auto_frame_use_case;
    pub mod pipeline_executor;
    pub mod pipeline_logger;
    pub mod infrastructure {
        pub mod threaded_pipeline_executor;
    }
}

pub mod shared {
    pub mod bounding_box;
    pub mod constants;
    pub mod frame;
    pub mod frame_slot;
    pub mod framing_config;
}
