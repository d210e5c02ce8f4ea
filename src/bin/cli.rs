use std::io::{self, Write};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use care_route::persistence::{
    load_resources_from_csv, load_snapshot_from_json, load_tasks_from_csv, save_resources_to_csv,
    save_snapshot_to_json, save_tasks_to_csv,
};
use care_route::{
    AssignmentStore, BookingError, CancelToken, EngineConfig, MemoryStore, Resource, RouteStatus,
    RunRequest, Scheduler, StrategyKind, Task, TaskUpdate, VisitStatus,
};

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(ci, h)| rows.iter().map(|r| r[ci].len()).fold(h.len(), usize::max))
        .collect();
    let rule = widths
        .iter()
        .fold(String::from("+"), |acc, w| acc + &"-".repeat(w + 2) + "+");
    let line = |cells: Vec<&str>| {
        let body: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!(" {:<w$} ", cell, w = *w))
            .collect();
        format!("|{}|", body.join("|"))
    };

    let mut out = vec![rule.clone(), line(headers.to_vec()), rule.clone()];
    out.extend(rows.iter().map(|r| line(r.iter().map(String::as_str).collect())));
    out.push(rule);
    out.join("\n")
}

fn render_visits(tasks: &[Task]) -> String {
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.service_type.clone(),
                t.start.format("%H:%M").to_string(),
                t.end.format("%H:%M").to_string(),
                t.resource_id.clone().unwrap_or_default(),
                t.route_id.map(|id| id.to_string()).unwrap_or_default(),
                t.status.to_string(),
            ]
        })
        .collect();
    render_table(&["id", "service", "start", "end", "resource", "route", "status"], &rows)
}

fn print_help() {
    println!(
        "Commands:\n  help                                         Show this help\n  resource <id> <max_minutes> <tags;...> [name...]\n                                               Upsert a caregiver\n  visit <id> <service> <YYYY-MM-DD> <HH:MM> <HH:MM> [resource]\n                                               Upsert a visit (double bookings are rejected)\n  cancel <id> | complete <id>                  Mark a visit cancelled or completed\n  status <id> <status>                         Set a visit status\n  delete <id>                                  Remove a visit\n  schedule <YYYY-MM-DD> [exact|heuristic] [r1,r2]\n                                               Assign the open visits of a date\n  assign <visit_id> <resource>                 Book one visit on a caregiver\n  visits <YYYY-MM-DD>                          Show the visits of a date\n  routes <YYYY-MM-DD>                          Show the routes of a date\n  route <route_id> <draft|confirmed|completed> Set a route status\n  progress <YYYY-MM-DD>                        Show completion figures\n  save json <path> | load json <path>          Save or load the whole store\n  import tasks|resources <csv>                 Load records from CSV\n  export tasks|resources <csv>                 Write records to CSV\n  quit|exit                                    Exit"
    );
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_time(date: NaiveDate, s: &str) -> Option<NaiveDateTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok().map(|t| date.and_time(t))
}

fn import_records(store: &MemoryStore, kind: &str, path: &str) -> Result<usize, String> {
    match kind {
        "tasks" => {
            let tasks = load_tasks_from_csv(path).map_err(|e| e.to_string())?;
            for task in &tasks {
                store.upsert_task(task).map_err(|e| e.to_string())?;
            }
            Ok(tasks.len())
        }
        "resources" => {
            let resources = load_resources_from_csv(path).map_err(|e| e.to_string())?;
            for resource in &resources {
                store.upsert_resource(resource).map_err(|e| e.to_string())?;
            }
            Ok(resources.len())
        }
        other => Err(format!("Unknown record kind '{}'", other)),
    }
}

fn export_records(store: &MemoryStore, kind: &str, path: &str) -> Result<usize, String> {
    match kind {
        "tasks" => {
            let tasks = store.tasks();
            save_tasks_to_csv(&tasks, path).map_err(|e| e.to_string())?;
            Ok(tasks.len())
        }
        "resources" => {
            let resources = store.resources();
            save_resources_to_csv(&resources, path).map_err(|e| e.to_string())?;
            Ok(resources.len())
        }
        other => Err(format!("Unknown record kind '{}'", other)),
    }
}

fn main() {
    env_logger::init();
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}; using defaults", e);
            EngineConfig::default()
        }
    };
    let mut scheduler = Scheduler::new(MemoryStore::new());

    println!("Care Route (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() { continue; }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let store = scheduler.store().clone();

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "resource" => {
                let id = parts.next();
                let max_s = parts.next();
                let tags = parts.next();
                match (id, max_s, tags) {
                    (Some(id), Some(max_s), Some(tags)) => {
                        let max: i64 = match max_s.parse() { Ok(v) => v, Err(_) => { println!("Invalid max_minutes"); continue; } };
                        let name: Vec<&str> = parts.collect();
                        let resource = Resource::new(id, max)
                            .with_name(name.join(" "))
                            .with_capabilities(tags.split(';').filter(|t| !t.is_empty()));
                        match store.upsert_resource(&resource) {
                            Ok(_) => println!("Resource {} saved.", id),
                            Err(e) => println!("Error: {}", e),
                        }
                    }
                    _ => println!("Usage: resource <id> <max_minutes> <tags;...> [name...]"),
                }
            }
            "visit" => {
                let args: Vec<&str> = parts.collect();
                if args.len() < 5 {
                    println!("Usage: visit <id> <service> <YYYY-MM-DD> <HH:MM> <HH:MM> [resource]");
                    continue;
                }
                let id: i32 = match args[0].parse() { Ok(v) => v, Err(_) => { println!("Invalid id"); continue; } };
                let date = match parse_date(args[2]) { Some(d) => d, None => { println!("Invalid date (YYYY-MM-DD)"); continue; } };
                let (start, end) = match (parse_time(date, args[3]), parse_time(date, args[4])) {
                    (Some(s), Some(e)) => (s, e),
                    _ => { println!("Invalid time (HH:MM)"); continue; }
                };
                let mut task = Task::new(id, args[1], start, end);
                task.resource_id = args.get(5).map(|r| r.to_string());
                match scheduler.add_task(task) {
                    Ok(saved) => println!(
                        "Visit {} saved.{}",
                        saved.id,
                        saved.route_id.map(|r| format!(" Route {}.", r)).unwrap_or_default()
                    ),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "cancel" | "complete" | "status" | "delete" => {
                let id: i32 = match parts.next().and_then(|s| s.parse().ok()) { Some(v) => v, None => { println!("Usage: {} <id>{}", cmd, if cmd == "status" { " <status>" } else { "" }); continue; } };
                let result = match cmd {
                    "delete" => scheduler.delete_task(id).map(|_| "deleted".to_string()),
                    _ => {
                        let status = match cmd {
                            "cancel" => VisitStatus::Cancelled,
                            "complete" => VisitStatus::Completed,
                            _ => match parts.next().map(str::parse::<VisitStatus>) {
                                Some(Ok(status)) => status,
                                Some(Err(e)) => { println!("Error: {}", e); continue; }
                                None => { println!("Usage: status <id> <scheduled|completed|cancelled|not_done>"); continue; }
                            },
                        };
                        scheduler
                            .update_task(id, &TaskUpdate::status(status))
                            .map(|task| task.status.to_string())
                    }
                };
                match result {
                    Ok(outcome) => println!("Visit {} {}.", id, outcome),
                    Err(BookingError::NotFound(_)) => println!("Visit {} not found.", id),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "schedule" => {
                let date = match parts.next().and_then(parse_date) { Some(d) => d, None => { println!("Usage: schedule <YYYY-MM-DD> [exact|heuristic] [r1,r2]"); continue; } };
                let strategy = match parts.next() {
                    Some(s) => match s.parse::<StrategyKind>() { Ok(k) => k, Err(e) => { println!("Error: {}", e); continue; } },
                    None => config.strategy,
                };
                let mut request = RunRequest::new(date)
                    .with_strategy(strategy)
                    .with_solver(config.solver_config());
                if let Some(ids) = parts.next() {
                    request = request.with_resources(ids.split(',').filter(|s| !s.is_empty()));
                }
                match scheduler.run(&request, &CancelToken::new()) {
                    Ok(report) => {
                        let status = report.status.map(|s| s.to_string()).unwrap_or_else(|| "skipped".to_string());
                        println!(
                            "Scheduled {}/{} visits on {} ({}), {} new route(s).",
                            report.assigned, report.considered, report.date, status, report.routes_created
                        );
                        for notice in &report.notices {
                            println!("  notice: {:?}", notice);
                        }
                    }
                    Err(e) => println!("Run failed: {}", e),
                }
            }
            "assign" => {
                let id_s = parts.next();
                let resource = parts.next();
                match (id_s, resource) {
                    (Some(id_s), Some(resource)) => {
                        let id: i32 = match id_s.parse() { Ok(v) => v, Err(_) => { println!("Invalid id"); continue; } };
                        match scheduler.assign_task(id, resource) {
                            Ok(route) => println!(
                                "Visit {} booked on {} (route {}, {:.2} h).",
                                id, resource, route.id, route.total_hours()
                            ),
                            Err(e) => println!("Error: {}", e),
                        }
                    }
                    _ => println!("Usage: assign <visit_id> <resource>"),
                }
            }
            "visits" => {
                let date = match parts.next().and_then(parse_date) { Some(d) => d, None => { println!("Usage: visits <YYYY-MM-DD>"); continue; } };
                match store.tasks_for(date) {
                    Ok(mut tasks) => {
                        tasks.sort_by_key(|t| (t.start, t.id));
                        println!("{}", render_visits(&tasks));
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "routes" => {
                let date = match parts.next().and_then(parse_date) { Some(d) => d, None => { println!("Usage: routes <YYYY-MM-DD>"); continue; } };
                match store.routes_for(date) {
                    Ok(routes) => {
                        let rows: Vec<Vec<String>> = routes
                            .iter()
                            .map(|r| {
                                vec![
                                    r.id.to_string(),
                                    r.resource_id().to_string(),
                                    r.status.as_str().to_string(),
                                    r.generated_by.as_str().to_string(),
                                    format!("{:.2}", r.total_hours()),
                                    r.task_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(","),
                                ]
                            })
                            .collect();
                        println!("{}", render_table(&["route", "resource", "status", "origin", "hours", "visits"], &rows));
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "route" => {
                let id_s = parts.next();
                let status_s = parts.next();
                match (id_s, status_s) {
                    (Some(id_s), Some(status_s)) => {
                        let id: i64 = match id_s.parse() { Ok(v) => v, Err(_) => { println!("Invalid route id"); continue; } };
                        let status: RouteStatus = match status_s.parse() { Ok(v) => v, Err(e) => { println!("Error: {}", e); continue; } };
                        match scheduler.set_route_status(id, status) {
                            Ok(route) => println!("Route {} is now {}.", route.id, route.status.as_str()),
                            Err(e) => println!("Error: {}", e),
                        }
                    }
                    _ => println!("Usage: route <route_id> <draft|confirmed|completed>"),
                }
            }
            "progress" => {
                let date = match parts.next().and_then(parse_date) { Some(d) => d, None => { println!("Usage: progress <YYYY-MM-DD>"); continue; } };
                match scheduler.progress(date) {
                    Ok(p) => {
                        println!(
                            "{}: {} visits, {} completed, {} cancelled, {} unassigned ({:.1}%)",
                            p.date, p.total, p.completed, p.cancelled, p.unassigned, p.rate
                        );
                        let rows: Vec<Vec<String>> = p
                            .by_resource
                            .iter()
                            .map(|r| {
                                vec![
                                    r.resource_id.clone(),
                                    r.total.to_string(),
                                    r.completed.to_string(),
                                    format!("{:.1}", r.rate),
                                    format!("{:.2}", r.booked_hours),
                                ]
                            })
                            .collect();
                        println!("{}", render_table(&["resource", "visits", "completed", "rate", "hours"], &rows));
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "save" | "load" => {
                let format = parts.next();
                let path = parts.next();
                match (format, path) {
                    (Some("json"), Some(path)) => {
                        if cmd == "save" {
                            match save_snapshot_to_json(store.as_ref(), path) {
                                Ok(_) => println!("Store saved to {}", path),
                                Err(e) => println!("Save error: {}", e),
                            }
                        } else {
                            match load_snapshot_from_json(path) {
                                Ok(loaded) => {
                                    scheduler = Scheduler::new(loaded);
                                    println!("Store loaded from {}", path);
                                }
                                Err(e) => println!("Load error: {}", e),
                            }
                        }
                    }
                    _ => println!("Usage: {} json <path>", cmd),
                }
            }
            "import" | "export" => {
                let kind = parts.next();
                let path = parts.next();
                match (kind, path) {
                    (Some(kind), Some(path)) => {
                        let result = if cmd == "import" {
                            import_records(store.as_ref(), kind, path)
                        } else {
                            export_records(store.as_ref(), kind, path)
                        };
                        match result {
                            Ok(n) => println!("{} {} {}.", if cmd == "import" { "Imported" } else { "Exported" }, n, kind),
                            Err(e) => println!("Error: {}", e),
                        }
                    }
                    _ => println!("Usage: {} tasks|resources <csv>", cmd),
                }
            }
            _ => {
                println!("Unknown command. Type 'help'.");
            }
        }
    }
}
