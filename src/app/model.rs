// Defines the core data structures for the application.

/// One of the fixed services making up the local stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceName {
    Database,
    Web,
    Runtime,
}

impl ServiceName {
    /// Every managed service, in start/stop-all order.
    pub const ALL: [ServiceName; 3] = [ServiceName::Database, ServiceName::Web, ServiceName::Runtime];

    pub fn label(self) -> &'static str {
        match self {
            ServiceName::Database => "Database",
            ServiceName::Web => "Web server",
            ServiceName::Runtime => "PHP runtime",
        }
    }

    /// Services that always follow this one's start/stop.
    pub fn companions(self) -> &'static [ServiceName] {
        match self {
            ServiceName::Web => &[ServiceName::Runtime],
            ServiceName::Database | ServiceName::Runtime => &[],
        }
    }

    fn index(self) -> usize {
        match self {
            ServiceName::Database => 0,
            ServiceName::Web => 1,
            ServiceName::Runtime => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
}

impl Action {
    /// The `brew services` verb.
    pub fn verb(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
        }
    }
}

/// Running flags for the fixed service set. Anything never set reads as stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    running: [bool; 3],
}

impl ServiceStatus {
    pub fn is_running(&self, name: ServiceName) -> bool {
        self.running[name.index()]
    }

    pub fn set(&mut self, name: ServiceName, running: bool) {
        self.running[name.index()] = running;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceName, bool)> + '_ {
        ServiceName::ALL.into_iter().map(|name| (name, self.is_running(name)))
    }
}

/// Homebrew formula backing each service. Doubles as the token looked for in
/// `brew services list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formulae {
    pub web: String,
    pub runtime: String,
    pub database: String,
}

impl Formulae {
    pub fn get(&self, name: ServiceName) -> &str {
        match name {
            ServiceName::Database => &self.database,
            ServiceName::Web => &self.web,
            ServiceName::Runtime => &self.runtime,
        }
    }
}

impl Default for Formulae {
    fn default() -> Self {
        Self {
            web: "nginx".to_string(),
            runtime: "php@8.3".to_string(),
            database: "mariadb".to_string(),
        }
    }
}

/// A set of start/stop commands tracked as one unit of busy state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOperation {
    steps: Vec<(Action, ServiceName)>,
}

impl BatchOperation {
    /// Stop `service` if it is running, start it otherwise. Companions get the same action.
    pub fn toggle(service: ServiceName, status: &ServiceStatus) -> Self {
        let action = if status.is_running(service) {
            Action::Stop
        } else {
            Action::Start
        };

        let steps = std::iter::once(service)
            .chain(service.companions().iter().copied())
            .map(|name| (action, name))
            .collect();
        Self { steps }
    }

    pub fn start_all() -> Self {
        Self::all(Action::Start)
    }

    pub fn stop_all() -> Self {
        Self::all(Action::Stop)
    }

    fn all(action: Action) -> Self {
        Self {
            steps: ServiceName::ALL.iter().map(|&name| (action, name)).collect(),
        }
    }

    pub fn steps(&self) -> &[(Action, ServiceName)] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
